//! Software stand-in for the behavior box.
//!
//! `SimulatedBox` walks a [`StateMachineSpec`] the way the hardware does: it
//! applies each state's output actions, fires `Tup` when a finite timer elapses,
//! and takes input transitions produced by a [`Subject`] model. The resulting
//! trace has the same shape the hardware reports.

use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trialbox_core::{
    Action, InputEvent, Output, Port, RawEventTrace, State, StateId, StateMachineSpec, Target,
    TraceKind, Trigger,
};
use trialbox_timing::Timer;

use crate::control::SessionControl;
use crate::error::{ConfigurationError, HardwareError};
use crate::executor::HardwareExecutor;

/// Upper bound on state entries per trial before the box gives up.
const MAX_TRANSITIONS: usize = 1_000;

/// What the animal does on a trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Correct,
    Wrong,
    NoResponse,
    EarlyWithdrawal,
}

pub trait Subject {
    /// Called once when a trial starts.
    fn next_response(&mut self) -> Response;
}

/// Plays back a fixed list of responses, then `fallback` forever.
#[derive(Debug, Clone)]
pub struct ScriptedSubject {
    script: VecDeque<Response>,
    fallback: Response,
}

impl ScriptedSubject {
    pub fn new(script: impl IntoIterator<Item = Response>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: Response::NoResponse,
        }
    }

    pub fn with_fallback(mut self, fallback: Response) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Subject for ScriptedSubject {
    fn next_response(&mut self) -> Response {
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

/// Seeded subject with fixed accuracy and miss rates
#[derive(Debug, Clone)]
pub struct RandomSubject {
    rng: StdRng,
    accuracy: f64,
    miss_rate: f64,
}

impl RandomSubject {
    pub fn new(seed: u64, accuracy: f64, miss_rate: f64) -> Result<Self, ConfigurationError> {
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            accuracy: probability("accuracy", accuracy)?,
            miss_rate: probability("miss_rate", miss_rate)?,
        })
    }
}

fn probability(name: &'static str, p: f64) -> Result<f64, ConfigurationError> {
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(ConfigurationError::invalid(
            name,
            format!("{p} is not a probability"),
        ))
    }
}

impl Subject for RandomSubject {
    fn next_response(&mut self) -> Response {
        if self.rng.random_bool(self.miss_rate) {
            Response::NoResponse
        } else if self.rng.random_bool(self.accuracy) {
            Response::Correct
        } else {
            Response::Wrong
        }
    }
}

/// Latencies the simulated subject responds with, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimLatencies {
    pub center_poke: f64,
    pub side_poke: f64,
}

impl Default for SimLatencies {
    fn default() -> Self {
        Self {
            center_poke: 0.5,
            side_poke: 0.4,
        }
    }
}

pub struct SimHandle {
    spec: StateMachineSpec,
}

pub struct SimulatedBox<S: Subject, T: Timer> {
    subject: S,
    timer: T,
    latencies: SimLatencies,
    control: Option<SessionControl>,
    interrupt_on: BTreeSet<usize>,
    disconnect_at: Option<usize>,
    runs: usize,
}

impl<S: Subject, T: Timer> SimulatedBox<S, T> {
    pub fn new(subject: S, timer: T) -> Self {
        Self {
            subject,
            timer,
            latencies: SimLatencies::default(),
            control: None,
            interrupt_on: BTreeSet::new(),
            disconnect_at: None,
            runs: 0,
        }
    }

    pub fn with_latencies(mut self, latencies: SimLatencies) -> Self {
        self.latencies = latencies;
        self
    }

    /// Abort a running trial when the session's stop flag goes up.
    pub fn with_control(mut self, control: SessionControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Return an empty run for the `n`th call to `run` (0-based).
    pub fn interrupt_run(mut self, n: usize) -> Self {
        self.interrupt_on.insert(n);
        self
    }

    /// Drop the connection on the `n`th call to `run` (0-based).
    pub fn disconnect_at(mut self, n: usize) -> Self {
        self.disconnect_at = Some(n);
        self
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    fn stop_requested(&self) -> bool {
        self.control.as_ref().is_some_and(SessionControl::stop_requested)
    }

    // Input the subject produces while in `state`, with its delay from state entry.
    fn planned_input(
        &self,
        spec: &StateMachineSpec,
        state: &State,
        response: Response,
    ) -> Option<(f64, InputEvent)> {
        let planned = match (state.id, response) {
            (StateId::WaitForPoke, _) => Some((
                self.latencies.center_poke,
                InputEvent::PortIn(Port::Center),
            )),
            (StateId::Stimulus, Response::EarlyWithdrawal) => {
                let half = state.timeout.duration().unwrap_or_default() / 2;
                Some((half.as_secs_f64(), InputEvent::PortOut(Port::Center)))
            }
            (StateId::ResponseWindow, Response::Correct) => {
                side_leading_to(spec, state, StateId::Reward)
                    .map(|p| (self.latencies.side_poke, InputEvent::PortIn(p)))
            }
            (StateId::ResponseWindow, Response::Wrong) => {
                side_leading_to(spec, state, StateId::Punish)
                    .map(|p| (self.latencies.side_poke, InputEvent::PortIn(p)))
            }
            _ => None,
        };
        planned.filter(|(_, ev)| state.target(&Trigger::Input(*ev)).is_some())
    }

    fn execute(&mut self, spec: &StateMachineSpec) -> Result<Option<RawEventTrace>, HardwareError> {
        let response = self.subject.next_response();
        let mut trace = RawEventTrace::new(self.timer.now_secs());
        let mut open: BTreeSet<Output> = BTreeSet::new();
        let mut t = 0.0_f64;
        let mut state = spec.initial();

        for _ in 0..MAX_TRANSITIONS {
            if self.stop_requested() {
                // The box drops all outputs when halted.
                return Ok(None);
            }
            trace.push(
                t,
                TraceKind::StateEntered {
                    name: state.id.name().to_string(),
                },
            );
            for action in &state.actions {
                match action {
                    Action::Open(o) => open.insert(*o),
                    Action::Close(o) => open.remove(o),
                };
                trace.push(t, TraceKind::Output { action: *action });
            }

            let limit = state.timeout.duration().map(|d| d.as_secs_f64());
            let (dwell, trigger) = match (self.planned_input(spec, state, response), limit) {
                (Some((delay, ev)), Some(limit)) if delay < limit => (delay, Trigger::Input(ev)),
                (Some((delay, ev)), None) => (delay, Trigger::Input(ev)),
                (_, Some(limit)) => (limit, Trigger::Tup),
                (None, None) => {
                    return Err(HardwareError::Rejected(format!(
                        "simulated subject never leaves {}",
                        state.id
                    )));
                }
            };
            let wait = Duration::try_from_secs_f64(dwell).map_err(|_| {
                HardwareError::Rejected(format!("invalid dwell of {dwell} s in {}", state.id))
            })?;
            self.timer.sleep(wait);
            t += dwell;
            if let Trigger::Input(event) = trigger {
                trace.push(t, TraceKind::Input { event });
            }

            match state.target(&trigger) {
                Some(Target::State(next)) => {
                    state = spec.state(next).ok_or_else(|| {
                        HardwareError::Rejected(format!("undefined state {next}"))
                    })?;
                }
                Some(Target::Exit) => {
                    trace.push(t, TraceKind::TrialEnd);
                    if let Some(output) = open.first() {
                        return Err(HardwareError::OutputLeftOpen(*output));
                    }
                    return Ok(Some(trace));
                }
                None => {
                    return Err(HardwareError::Rejected(format!(
                        "{} has no transition for {trigger}",
                        state.id
                    )));
                }
            }
        }
        Err(HardwareError::Timeout(Duration::from_secs_f64(t)))
    }
}

fn side_leading_to(spec: &StateMachineSpec, state: &State, goal: StateId) -> Option<Port> {
    debug_assert!(spec.state(goal).is_some());
    state.transitions.iter().find_map(|(trigger, target)| match (trigger, target) {
        (Trigger::Input(InputEvent::PortIn(port)), Target::State(id))
            if *id == goal && *port != Port::Center =>
        {
            Some(*port)
        }
        _ => None,
    })
}

impl<S: Subject, T: Timer> HardwareExecutor for SimulatedBox<S, T> {
    type Handle = SimHandle;

    fn send(&mut self, spec: &StateMachineSpec) -> Result<SimHandle, HardwareError> {
        if self.disconnect_at == Some(self.runs) {
            return Err(HardwareError::Disconnected(format!(
                "simulated link dropped before trial {}",
                self.runs
            )));
        }
        Ok(SimHandle { spec: spec.clone() })
    }

    fn run(&mut self, handle: SimHandle) -> Result<Option<RawEventTrace>, HardwareError> {
        let n = self.runs;
        self.runs += 1;
        if self.interrupt_on.contains(&n) {
            tracing::debug!(run = n, "simulated box interrupted");
            return Ok(None);
        }
        self.execute(&handle.spec)
    }
}
