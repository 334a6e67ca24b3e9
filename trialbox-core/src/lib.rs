pub mod machine;
pub mod output;
pub mod status;
pub mod trace;
pub mod trial;

pub use machine::{SpecError, State, StateId, StateMachineSpec, Target, Timeout, Trigger};
pub use output::{Action, InputEvent, Output, Port};
pub use status::{SessionStatus, Signal};
pub use trace::{RawEventTrace, TraceEntry, TraceKind};
pub use trial::{
    Outcome, SideMapping, TimedInput, TrialParameters, TrialRecord, TrialType, ValveMap,
    VisitedState,
};
