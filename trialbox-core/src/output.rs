use serde::{Deserialize, Serialize};
use std::fmt;

/// Nose-poke ports on the behavior box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    Left,
    Center,
    Right,
}

impl Port {
    /// The competing side port, if any.
    pub fn opposite(&self) -> Option<Port> {
        match self {
            Port::Left => Some(Port::Right),
            Port::Right => Some(Port::Left),
            Port::Center => None,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Port::Left => "Left",
            Port::Center => "Center",
            Port::Right => "Right",
        })
    }
}

/// Input events reported by the poke sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEvent {
    PortIn(Port),
    PortOut(Port),
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputEvent::PortIn(p) => write!(f, "{p}In"),
            InputEvent::PortOut(p) => write!(f, "{p}Out"),
        }
    }
}

/// Latched actuators. Once opened they stay open until an explicit close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    Valve(u8),
    Led(u8),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Valve(n) => write!(f, "Valve{n}"),
            Output::Led(n) => write!(f, "Led{n}"),
        }
    }
}

/// Output action issued on state entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Open(Output),
    Close(Output),
}

impl Action {
    pub fn opened(&self) -> Option<Output> {
        match self {
            Action::Open(o) => Some(*o),
            Action::Close(_) => None,
        }
    }

    pub fn closed(&self) -> Option<Output> {
        match self {
            Action::Close(o) => Some(*o),
            Action::Open(_) => None,
        }
    }
}
