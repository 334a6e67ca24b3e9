use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use trialbox_core::{Output, SpecError, StateId, TrialType};

/// Invalid protocol setup. Always raised before the hardware is touched.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no valve mapping registered for trial type {0}")]
    MissingMapping(TrialType),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid state machine: {0}")]
    InvalidStateMachine(#[from] SpecError),

    #[error("`{field}` is {configured} but the session store recorded {recorded}")]
    HeaderMismatch {
        field: &'static str,
        recorded: String,
        configured: String,
    },

    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigurationError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("hardware connection lost: {0}")]
    Disconnected(String),

    #[error("hardware rejected state machine: {0}")]
    Rejected(String),

    #[error("hardware did not answer within {0:?}")]
    Timeout(Duration),

    #[error("{0} was still open when the trial ended")]
    OutputLeftOpen(Output),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("session store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode session entry: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("corrupt session entry on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected session header on line {0}")]
    UnexpectedHeader(usize),

    #[error("trial {got} is out of order, expected trial {expected}")]
    OutOfOrder { expected: usize, got: usize },

    #[error("session store {0:?} already exists")]
    AlreadyExists(PathBuf),

    #[error("session store has no header")]
    MissingHeader,
}

/// Malformed hardware trace. Absorbed by the interpreter; the trial is aborted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpretationWarning {
    #[error("trace is empty")]
    EmptyTrace,

    #[error("trace contains no visited states")]
    NoStates,

    #[error("trace has no trial end marker")]
    MissingTrialEnd,

    #[error("trace reports unknown state `{0}`")]
    UnknownState(String),

    #[error("trace starts in {found} instead of {expected}")]
    WrongInitialState { expected: StateId, found: StateId },

    #[error("timestamp {at} precedes {previous}")]
    NonMonotonic { previous: f64, at: f64 },

    #[error("trace visits both reward and punish branches")]
    ConflictingBranches,

    #[error("trace ends in {0} without reaching reward, punish or the response timeout")]
    IncompleteTrial(StateId),
}

/// Fatal session errors reported by the loop
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
