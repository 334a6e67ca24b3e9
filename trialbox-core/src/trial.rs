use crate::machine::StateId;
use crate::output::{InputEvent, Output, Port};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which side pays out on a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialType {
    #[default]
    LeftRewarded,
    RightRewarded,
}

impl TrialType {
    pub const ALL: [TrialType; 2] = [TrialType::LeftRewarded, TrialType::RightRewarded];

    /// The other block type.
    pub fn flip(self) -> Self {
        match self {
            TrialType::LeftRewarded => TrialType::RightRewarded,
            TrialType::RightRewarded => TrialType::LeftRewarded,
        }
    }
}

impl fmt::Display for TrialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrialType::LeftRewarded => "left_rewarded",
            TrialType::RightRewarded => "right_rewarded",
        })
    }
}

/// Trial classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Reward,
    Punish,
    Timeout,
    Aborted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Reward => "reward",
            Outcome::Punish => "punish",
            Outcome::Timeout => "timeout",
            Outcome::Aborted => "aborted",
        })
    }
}

/// Outputs and ports wired to one trial type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideMapping {
    pub stimulus_output: Output,
    pub reward_port: Port,
    pub reward_valve: Output,
    pub punish_output: Output,
    /// Valve calibration: microliters delivered per second open.
    pub valve_ul_per_second: f64,
}

impl SideMapping {
    pub fn punished_port(&self) -> Option<Port> {
        self.reward_port.opposite()
    }

    /// Valve-open time delivering `volume_ul`.
    pub fn valve_time(&self, volume_ul: f64) -> Duration {
        Duration::from_secs_f64(volume_ul / self.valve_ul_per_second)
    }
}

/// Registered output mappings per trial type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValveMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_rewarded: Option<SideMapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_rewarded: Option<SideMapping>,
}

impl ValveMap {
    pub fn get(&self, trial_type: TrialType) -> Option<&SideMapping> {
        match trial_type {
            TrialType::LeftRewarded => self.left_rewarded.as_ref(),
            TrialType::RightRewarded => self.right_rewarded.as_ref(),
        }
    }

    pub fn insert(&mut self, trial_type: TrialType, mapping: SideMapping) {
        match trial_type {
            TrialType::LeftRewarded => self.left_rewarded = Some(mapping),
            TrialType::RightRewarded => self.right_rewarded = Some(mapping),
        }
    }

    pub fn with(mut self, trial_type: TrialType, mapping: SideMapping) -> Self {
        self.insert(trial_type, mapping);
        self
    }
}

/// Parameter snapshot a single trial runs with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialParameters {
    pub stimulus_duration: Duration,
    pub reward_volume_ul: f64,
    pub response_window: Duration,
    pub punishment_duration: Duration,
    pub valves: ValveMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitedState {
    pub state: StateId,
    pub entered_at: f64,
    pub exited_at: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedInput {
    pub timestamp: f64,
    pub event: InputEvent,
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub index: usize,
    pub trial_type: TrialType,
    pub trial_start_timestamp: f64,
    pub visited: Vec<VisitedState>,
    pub inputs: Vec<TimedInput>,
    pub outcome: Outcome,
    pub parameters: TrialParameters,
}

impl TrialRecord {
    pub fn visited(&self, state: StateId) -> bool {
        self.visited.iter().any(|v| v.state == state)
    }

    /// Seconds from the response window opening to the first side poke.
    pub fn reaction_time(&self) -> Option<f64> {
        let window = self
            .visited
            .iter()
            .find(|v| v.state == StateId::ResponseWindow)?;
        self.inputs
            .iter()
            .find(|i| {
                i.timestamp >= window.entered_at
                    && matches!(i.event, InputEvent::PortIn(p) if p != Port::Center)
            })
            .map(|i| i.timestamp - window.entered_at)
    }
}
