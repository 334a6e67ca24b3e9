use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Closed-loop two-alternative choice sessions on a simulated behavior box
#[derive(Parser, Debug, Clone)]
#[command(name = "trialbox")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Show debug output (overridden by RUST_LOG)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a session
    Run(RunArgs),
    /// Print outcome counts for a recorded session
    Summary {
        /// Session store written by `run`
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Protocol file (TOML). Built-in defaults when omitted.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Session store to write (JSON Lines)
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Append to an existing store instead of refusing to overwrite it
    #[arg(long)]
    pub resume: bool,

    /// Override `max_trials` from the protocol
    #[arg(short = 'n', long)]
    pub max_trials: Option<usize>,

    /// Re-read the protocol file between trials and apply edits
    #[arg(long, requires = "config")]
    pub watch: bool,

    /// Run on the wall clock instead of a simulated one
    #[arg(long)]
    pub realtime: bool,

    /// Seed for the simulated subject
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Probability the simulated subject picks the rewarded side
    #[arg(long, default_value_t = 0.8, value_parser = probability)]
    pub accuracy: f64,

    /// Probability the simulated subject does not respond
    #[arg(long, default_value_t = 0.1, value_parser = probability)]
    pub miss_rate: f64,
}

fn probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{s} is not between 0 and 1"))
    }
}
