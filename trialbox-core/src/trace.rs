use crate::output::{Action, InputEvent};
use serde::{Deserialize, Serialize};

/// Flat event log returned by the hardware for one trial.
///
/// Timestamps are seconds relative to `trial_start_timestamp`, which is itself on
/// the hardware clock. State names are whatever the hardware reports.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawEventTrace {
    pub trial_start_timestamp: f64,
    pub entries: Vec<TraceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: f64,
    pub kind: TraceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceKind {
    StateEntered { name: String },
    Input { event: InputEvent },
    Output { action: Action },
    TrialEnd,
}

impl RawEventTrace {
    pub fn new(trial_start_timestamp: f64) -> Self {
        Self {
            trial_start_timestamp,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, timestamp: f64, kind: TraceKind) {
        self.entries.push(TraceEntry { timestamp, kind });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time of the `TrialEnd` marker, if the hardware reported one.
    pub fn end_timestamp(&self) -> Option<f64> {
        self.entries
            .iter()
            .rev()
            .find(|e| matches!(e.kind, TraceKind::TrialEnd))
            .map(|e| e.timestamp)
    }
}
