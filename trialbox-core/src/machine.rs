use crate::output::{Action, InputEvent, Output};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Named states of a trial state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateId {
    WaitForPoke,
    Stimulus,
    StimulusSettle,
    WithdrawalSettle,
    ResponseWindow,
    Reward,
    RewardSettle,
    Punish,
    PunishSettle,
}

impl StateId {
    pub const ALL: [StateId; 9] = [
        StateId::WaitForPoke,
        StateId::Stimulus,
        StateId::StimulusSettle,
        StateId::WithdrawalSettle,
        StateId::ResponseWindow,
        StateId::Reward,
        StateId::RewardSettle,
        StateId::Punish,
        StateId::PunishSettle,
    ];

    /// Name the hardware layer reports when the state is entered.
    pub fn name(&self) -> &'static str {
        match self {
            StateId::WaitForPoke => "WaitForPoke",
            StateId::Stimulus => "Stimulus",
            StateId::StimulusSettle => "StimulusSettle",
            StateId::WithdrawalSettle => "WithdrawalSettle",
            StateId::ResponseWindow => "ResponseWindow",
            StateId::Reward => "Reward",
            StateId::RewardSettle => "RewardSettle",
            StateId::Punish => "Punish",
            StateId::PunishSettle => "PunishSettle",
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown state name `{0}`")]
pub struct UnknownState(pub String);

impl FromStr for StateId {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateId::ALL
            .iter()
            .copied()
            .find(|id| id.name() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// How long a state lasts before `Tup` fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Infinite,
    After(Duration),
}

impl Timeout {
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Timeout::Infinite => None,
            Timeout::After(d) => Some(*d),
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Timeout::After(_))
    }
}

/// What can move the machine out of a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Trigger {
    Input(InputEvent),
    /// The state's timer elapsed.
    Tup,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Input(ev) => write!(f, "{ev}"),
            Trigger::Tup => f.write_str("Tup"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    State(StateId),
    Exit,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::State(id) => write!(f, "{id}"),
            Target::Exit => f.write_str("exit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: StateId,
    pub timeout: Timeout,
    pub transitions: BTreeMap<Trigger, Target>,
    pub actions: Vec<Action>,
}

impl State {
    pub fn new(id: StateId, timeout: Timeout) -> Self {
        Self {
            id,
            timeout,
            transitions: BTreeMap::new(),
            actions: Vec::new(),
        }
    }

    pub fn on(mut self, trigger: Trigger, target: Target) -> Self {
        self.transitions.insert(trigger, target);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn target(&self, trigger: &Trigger) -> Option<Target> {
        self.transitions.get(trigger).copied()
    }

    /// Outputs this state opens on entry
    pub fn opens(&self) -> impl Iterator<Item = Output> + '_ {
        self.actions.iter().filter_map(Action::opened)
    }

    pub fn closes(&self, output: Output) -> bool {
        self.actions.iter().any(|a| a.closed() == Some(output))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("state machine has no states")]
    Empty,
    #[error("state {0} is defined more than once")]
    DuplicateState(StateId),
    #[error("state {from} transitions to undefined state {to}")]
    UndefinedTarget { from: StateId, to: StateId },
    #[error("state {0} has a finite timeout but no Tup transition")]
    MissingTup(StateId),
    #[error("state {0} waits forever and has no input transition")]
    DeadEnd(StateId),
    #[error("state {state} opens {output} and waits forever")]
    OpenWithoutTimeout { state: StateId, output: Output },
    #[error("state {state} opens {output} but leaving on {trigger} never closes it")]
    UnclosedOutput {
        state: StateId,
        output: Output,
        trigger: Trigger,
    },
}

/// Validated state table sent to the hardware for a single trial.
///
/// The first state is the initial state. Construction checks that every target
/// exists and that every output opened by a state is closed in finite time on
/// every path leaving it. A `StateMachineSpec` is never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMachineSpec {
    states: Vec<State>,
}

impl StateMachineSpec {
    pub fn new(states: Vec<State>) -> Result<Self, SpecError> {
        if states.is_empty() {
            return Err(SpecError::Empty);
        }
        let spec = Self { states };
        spec.check_table()?;
        spec.check_outputs_closed()?;
        Ok(spec)
    }

    pub fn initial(&self) -> &State {
        &self.states[0]
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn check_table(&self) -> Result<(), SpecError> {
        for (i, state) in self.states.iter().enumerate() {
            if self.states[..i].iter().any(|s| s.id == state.id) {
                return Err(SpecError::DuplicateState(state.id));
            }
            for target in state.transitions.values() {
                if let Target::State(to) = target {
                    if self.state(*to).is_none() {
                        return Err(SpecError::UndefinedTarget {
                            from: state.id,
                            to: *to,
                        });
                    }
                }
            }
            match state.timeout {
                Timeout::After(_) if state.target(&Trigger::Tup).is_none() => {
                    return Err(SpecError::MissingTup(state.id));
                }
                Timeout::Infinite
                    if !state
                        .transitions
                        .keys()
                        .any(|t| matches!(t, Trigger::Input(_))) =>
                {
                    return Err(SpecError::DeadEnd(state.id));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_outputs_closed(&self) -> Result<(), SpecError> {
        for state in &self.states {
            for output in state.opens() {
                if !state.timeout.is_finite() {
                    return Err(SpecError::OpenWithoutTimeout {
                        state: state.id,
                        output,
                    });
                }
                for (trigger, target) in &state.transitions {
                    let mut path = vec![state.id];
                    if !self.closes_on_every_path(*target, output, &mut path) {
                        return Err(SpecError::UnclosedOutput {
                            state: state.id,
                            output,
                            trigger: *trigger,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    // A path fails if it exits, loops, or parks in a state without a timer before
    // the output is closed.
    fn closes_on_every_path(
        &self,
        target: Target,
        output: Output,
        path: &mut Vec<StateId>,
    ) -> bool {
        let Target::State(id) = target else {
            return false;
        };
        if path.contains(&id) {
            return false;
        }
        let Some(state) = self.state(id) else {
            return false;
        };
        if state.closes(output) {
            return true;
        }
        if !state.timeout.is_finite() {
            return false;
        }
        path.push(id);
        let closed = state
            .transitions
            .values()
            .all(|next| self.closes_on_every_path(*next, output, path));
        path.pop();
        closed
    }
}
