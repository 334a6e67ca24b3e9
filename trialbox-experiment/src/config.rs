use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trialbox_core::{Output, Port, SideMapping, TrialParameters, TrialType, ValveMap};

use crate::builder::check_parameters;
use crate::error::ConfigurationError;

/// How the trial type of each trial is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Block switching driven by the reward streak.
    #[default]
    Adaptive,
    /// Always `initial_trial_type`.
    Fixed,
    /// Seeded coin flips with a cap on same-type runs.
    Randomized,
}

/// Protocol settings loaded from TOML.
///
/// The four core options also accept the PascalCase spellings used by older
/// protocol files (`StimulusDurationSeconds`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(
        default = "default_stimulus_duration",
        alias = "StimulusDurationSeconds"
    )]
    pub stimulus_duration_seconds: f64,

    #[serde(default = "default_reward_volume", alias = "RewardVolumeMicroliters")]
    pub reward_volume_microliters: f64,

    #[serde(default = "default_response_window", alias = "ResponseWindowSeconds")]
    pub response_window_seconds: f64,

    #[serde(default = "default_punishment_duration")]
    pub punishment_duration_seconds: f64,

    #[serde(default = "default_switch_threshold", alias = "SwitchThreshold")]
    pub switch_threshold: u32,

    #[serde(default = "default_inter_trial_interval")]
    pub inter_trial_interval_seconds: f64,

    /// Stop after this many recorded trials. Unbounded when absent.
    #[serde(default)]
    pub max_trials: Option<usize>,

    #[serde(default)]
    pub initial_trial_type: TrialType,

    #[serde(default)]
    pub schedule: ScheduleMode,

    #[serde(default)]
    pub seed: u64,

    #[serde(default = "default_max_same_type_run")]
    pub max_same_type_run: usize,

    #[serde(default = "default_valves")]
    pub valves: ValveMap,
}

fn default_subject() -> String {
    "unnamed".to_string()
}

fn default_protocol() -> String {
    "two_alternative_choice".to_string()
}

fn default_stimulus_duration() -> f64 {
    0.2
}

fn default_reward_volume() -> f64 {
    3.0
}

fn default_response_window() -> f64 {
    2.0
}

fn default_punishment_duration() -> f64 {
    3.0
}

fn default_switch_threshold() -> u32 {
    10
}

fn default_inter_trial_interval() -> f64 {
    1.0
}

fn default_max_same_type_run() -> usize {
    3
}

/// Standard box wiring: side valves 1 and 3, cue lights on the center port,
/// house light as the punishment signal.
pub fn default_valves() -> ValveMap {
    ValveMap::default()
        .with(
            TrialType::LeftRewarded,
            SideMapping {
                stimulus_output: Output::Led(1),
                reward_port: Port::Left,
                reward_valve: Output::Valve(1),
                punish_output: Output::Led(4),
                valve_ul_per_second: 30.0,
            },
        )
        .with(
            TrialType::RightRewarded,
            SideMapping {
                stimulus_output: Output::Led(3),
                reward_port: Port::Right,
                reward_valve: Output::Valve(3),
                punish_output: Output::Led(4),
                valve_ul_per_second: 30.0,
            },
        )
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            protocol: default_protocol(),
            stimulus_duration_seconds: default_stimulus_duration(),
            reward_volume_microliters: default_reward_volume(),
            response_window_seconds: default_response_window(),
            punishment_duration_seconds: default_punishment_duration(),
            switch_threshold: default_switch_threshold(),
            inter_trial_interval_seconds: default_inter_trial_interval(),
            max_trials: None,
            initial_trial_type: TrialType::default(),
            schedule: ScheduleMode::default(),
            seed: 0,
            max_same_type_run: default_max_same_type_run(),
            valves: default_valves(),
        }
    }
}

impl ProtocolConfig {
    /// Read, parse and validate a protocol file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: ProtocolConfig =
            toml::from_str(&contents).map_err(|source| ConfigurationError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        tracing::info!(path = ?path, subject = %config.subject, "loaded protocol config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_parameters(&self.trial_parameters()?)?;
        self.inter_trial_interval()?;

        if self.switch_threshold < 1 {
            return Err(ConfigurationError::invalid(
                "switch_threshold",
                "must be at least 1",
            ));
        }
        if self.max_trials == Some(0) {
            return Err(ConfigurationError::invalid(
                "max_trials",
                "must be at least 1 when set",
            ));
        }
        if self.schedule == ScheduleMode::Randomized && self.max_same_type_run < 1 {
            return Err(ConfigurationError::invalid(
                "max_same_type_run",
                "must be at least 1",
            ));
        }

        // Every type the schedule can reach needs wiring up front.
        let reachable: &[TrialType] = match self.schedule {
            ScheduleMode::Fixed => std::slice::from_ref(&self.initial_trial_type),
            ScheduleMode::Adaptive | ScheduleMode::Randomized => &TrialType::ALL,
        };
        for trial_type in reachable {
            if self.valves.get(*trial_type).is_none() {
                return Err(ConfigurationError::MissingMapping(*trial_type));
            }
        }
        Ok(())
    }

    /// Snapshot of the per-trial parameters described by this config.
    pub fn trial_parameters(&self) -> Result<TrialParameters, ConfigurationError> {
        Ok(TrialParameters {
            stimulus_duration: seconds(
                "stimulus_duration_seconds",
                self.stimulus_duration_seconds,
            )?,
            reward_volume_ul: self.reward_volume_microliters,
            response_window: seconds("response_window_seconds", self.response_window_seconds)?,
            punishment_duration: seconds(
                "punishment_duration_seconds",
                self.punishment_duration_seconds,
            )?,
            valves: self.valves.clone(),
        })
    }

    pub fn inter_trial_interval(&self) -> Result<Duration, ConfigurationError> {
        seconds(
            "inter_trial_interval_seconds",
            self.inter_trial_interval_seconds,
        )
    }
}

fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigurationError> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| ConfigurationError::invalid(name, format!("{value} is not a valid duration")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ProtocolConfig::default();
        config.validate().unwrap();
        let params = config.trial_parameters().unwrap();
        assert_eq!(params.stimulus_duration, Duration::from_millis(200));
        assert_eq!(params.response_window, Duration::from_secs(2));
    }

    #[test]
    fn parses_snake_case_and_pascal_case_keys() {
        let config: ProtocolConfig = toml::from_str(
            r#"
            StimulusDurationSeconds = 0.5
            RewardVolumeMicroliters = 2.5
            response_window_seconds = 1.5
            SwitchThreshold = 4
            schedule = "randomized"
            max_trials = 200
            "#,
        )
        .unwrap();
        assert_eq!(config.stimulus_duration_seconds, 0.5);
        assert_eq!(config.reward_volume_microliters, 2.5);
        assert_eq!(config.response_window_seconds, 1.5);
        assert_eq!(config.switch_threshold, 4);
        assert_eq!(config.schedule, ScheduleMode::Randomized);
        assert_eq!(config.max_trials, Some(200));
        config.validate().unwrap();
    }

    #[test]
    fn parses_valve_tables() {
        let config: ProtocolConfig = toml::from_str(
            r#"
            schedule = "fixed"
            initial_trial_type = "right_rewarded"

            [valves.right_rewarded]
            stimulus_output = { valve = 6 }
            reward_port = "right"
            reward_valve = { valve = 3 }
            punish_output = { led = 4 }
            valve_ul_per_second = 25.0
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        let mapping = config.valves.get(TrialType::RightRewarded).unwrap();
        assert_eq!(mapping.stimulus_output, Output::Valve(6));
        assert!(config.valves.get(TrialType::LeftRewarded).is_none());
    }

    #[test]
    fn adaptive_schedule_needs_both_mappings() {
        let mut config = ProtocolConfig::default();
        config.valves.right_rewarded = None;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingMapping(TrialType::RightRewarded)
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases: Vec<(fn(&mut ProtocolConfig), &str)> = vec![
            (|c| c.stimulus_duration_seconds = 0.0, "stimulus_duration"),
            (|c| c.response_window_seconds = -1.0, "response_window_seconds"),
            (|c| c.reward_volume_microliters = -0.5, "reward_volume"),
            (|c| c.switch_threshold = 0, "switch_threshold"),
            (|c| c.max_trials = Some(0), "max_trials"),
        ];
        for (mutate, name) in cases {
            let mut config = ProtocolConfig::default();
            mutate(&mut config);
            match config.validate() {
                Err(ConfigurationError::InvalidParameter { name: got, .. }) => {
                    assert!(got.starts_with(name), "{got} vs {name}")
                }
                other => panic!("expected invalid {name}, got {other:?}"),
            }
        }
    }
}
