pub mod adaptive;
pub mod builder;
pub mod config;
pub mod control;
pub mod error;
pub mod executor;
pub mod interpreter;
pub mod params;
pub mod recorder;
pub mod schedule;
pub mod sim;
pub mod state;
pub mod summary;
pub use adaptive::{AdaptiveController, AdaptiveState};
pub use builder::{SETTLE_DURATION, build_state_machine};
pub use config::{ProtocolConfig, ScheduleMode};
pub use control::SessionControl;
pub use error::{
    ConfigurationError, HardwareError, InterpretationWarning, PersistenceError, SessionError,
};
pub use executor::HardwareExecutor;
pub use interpreter::{Interpretation, TrialContext, interpret};
pub use params::{FileParameterSource, FixedParameters, ParameterSource};
pub use recorder::{SessionData, SessionHeader, SessionRecorder};
pub use schedule::TypeScheduler;
pub use sim::{RandomSubject, Response, ScriptedSubject, SimLatencies, SimulatedBox, Subject};
pub use state::{SessionLoop, SessionReport, StopReason};
pub use summary::SessionSummary;
