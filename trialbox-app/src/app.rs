use anyhow::{Context, Result, bail};
use clap::Parser;
use std::io::BufRead;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use trialbox_experiment::{
    FileParameterSource, ParameterSource, ProtocolConfig, RandomSubject, SessionControl,
    SessionHeader, SessionLoop, SessionRecorder, SessionReport, SessionSummary, SimulatedBox,
};
use trialbox_timing::{HighPrecisionTimer, ManualTimer, Timer};

use crate::args::{Cli, Command, RunArgs};

pub struct App {
    cli: Cli,
}

impl App {
    pub fn new() -> Self {
        Self { cli: Cli::parse() }
    }

    pub fn run(self) -> Result<()> {
        init_logging(self.cli.verbose);
        match &self.cli.command {
            Command::Run(args) => run_session(args),
            Command::Summary { path } => print_summary(path),
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(args: &RunArgs) -> Result<ProtocolConfig> {
    let mut config = match &args.config {
        Some(path) => ProtocolConfig::load(path)?,
        None => ProtocolConfig::default(),
    };
    if args.max_trials.is_some() {
        config.max_trials = args.max_trials;
    }
    config.validate()?;
    if !args.realtime && config.max_trials.is_none() {
        bail!("a simulated-clock session needs max_trials (use --max-trials or --realtime)");
    }
    Ok(config)
}

fn run_session(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;
    let report = if args.realtime {
        drive(args, &config, HighPrecisionTimer::new())?
    } else {
        drive(args, &config, ManualTimer::new())?
    };

    println!();
    println!("Session finished: {report:?}");
    print_summary(&args.output)
}

fn drive<T: Timer>(args: &RunArgs, config: &ProtocolConfig, timer: T) -> Result<SessionReport> {
    let control = SessionControl::new();
    let subject = RandomSubject::new(args.seed, args.accuracy, args.miss_rate)?;
    let sim = SimulatedBox::new(subject, timer.clone()).with_control(control.clone());

    let mut watcher = if args.watch {
        args.config.as_deref().map(FileParameterSource::new)
    } else {
        None
    };
    let parameters = move || watcher.as_mut().and_then(|w| w.poll());

    let (recorder, history) = if args.resume && args.output.exists() {
        let (recorder, data) = SessionRecorder::open(&args.output)
            .with_context(|| format!("reopening {}", args.output.display()))?;
        (recorder, data.trials)
    } else {
        let recorder = SessionRecorder::create(&args.output, SessionHeader::from_config(config))
            .with_context(|| format!("creating {}", args.output.display()))?;
        (recorder, Vec::new())
    };

    let mut session = SessionLoop::new(config, sim, parameters, recorder, timer)?
        .with_control(control.clone())
        .with_history(history)?;

    if args.realtime {
        println!("Commands: p = pause, r = resume, q = stop");
        spawn_command_reader(control);
    }
    Ok(session.run()?)
}

// Detached: blocks on stdin until the process exits.
fn spawn_command_reader(control: SessionControl) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match line.trim() {
                "p" => control.pause(),
                "r" => control.resume(),
                "q" => {
                    control.stop();
                    break;
                }
                "" => {}
                other => tracing::warn!(command = other, "unknown command"),
            }
        }
    });
}

fn print_summary(path: &Path) -> Result<()> {
    let data = SessionRecorder::read(path).with_context(|| format!("reading {}", path.display()))?;
    let summary = SessionSummary::from_records(&data.trials);
    println!("subject:      {}", data.header.subject);
    println!("protocol:     {}", data.header.protocol);
    println!("schedule:     {:?}", data.header.schedule);
    print!("{summary}");
    Ok(())
}
