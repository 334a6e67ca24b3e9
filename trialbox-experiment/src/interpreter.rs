use trialbox_core::{
    Outcome, RawEventTrace, StateId, TimedInput, TraceKind, TrialParameters, TrialRecord,
    TrialType, VisitedState,
};

use crate::error::InterpretationWarning;

/// What the loop knows about a trial before its trace arrives
#[derive(Debug, Clone, Copy)]
pub struct TrialContext<'a> {
    pub index: usize,
    pub trial_type: TrialType,
    pub parameters: &'a TrialParameters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub record: TrialRecord,
    pub warning: Option<InterpretationWarning>,
}

#[derive(Default)]
struct Scan {
    visited: Vec<VisitedState>,
    inputs: Vec<TimedInput>,
    ended: bool,
}

/// Turn a raw hardware trace into a trial record.
///
/// Never fails: a trace that cannot be read as a complete trial is classified
/// `Aborted` and the reason is returned as a warning.
pub fn interpret(trace: &RawEventTrace, ctx: TrialContext<'_>) -> Interpretation {
    let (scan, problem) = scan(trace);
    let (outcome, warning) = match problem.or_else(|| check_complete(trace, &scan)) {
        Some(warning) => (Outcome::Aborted, Some(warning)),
        None => classify(&scan),
    };
    if let Some(warning) = &warning {
        tracing::warn!(trial = ctx.index, %warning, "malformed trace, trial aborted");
    }

    Interpretation {
        record: TrialRecord {
            index: ctx.index,
            trial_type: ctx.trial_type,
            trial_start_timestamp: trace.trial_start_timestamp,
            visited: scan.visited,
            inputs: scan.inputs,
            outcome,
            parameters: ctx.parameters.clone(),
        },
        warning,
    }
}

// Reads entries up to the first problem, keeping what was valid before it.
fn scan(trace: &RawEventTrace) -> (Scan, Option<InterpretationWarning>) {
    let mut scan = Scan::default();
    let mut previous = f64::NEG_INFINITY;

    for entry in &trace.entries {
        let at = entry.timestamp;
        if !at.is_finite() || at < previous {
            close_last(&mut scan.visited, previous);
            return (scan, Some(InterpretationWarning::NonMonotonic { previous, at }));
        }
        previous = at;

        match &entry.kind {
            TraceKind::StateEntered { name } => {
                let Ok(state) = name.parse::<StateId>() else {
                    close_last(&mut scan.visited, at);
                    return (scan, Some(InterpretationWarning::UnknownState(name.clone())));
                };
                close_last(&mut scan.visited, at);
                scan.visited.push(VisitedState {
                    state,
                    entered_at: at,
                    exited_at: at,
                });
            }
            TraceKind::Input { event } => scan.inputs.push(TimedInput {
                timestamp: at,
                event: *event,
            }),
            TraceKind::Output { .. } => {}
            TraceKind::TrialEnd => {
                close_last(&mut scan.visited, at);
                scan.ended = true;
                break;
            }
        }
    }
    if !scan.ended && previous.is_finite() {
        close_last(&mut scan.visited, previous);
    }
    (scan, None)
}

fn close_last(visited: &mut [VisitedState], at: f64) {
    if let Some(last) = visited.last_mut() {
        if at.is_finite() && at >= last.entered_at {
            last.exited_at = at;
        }
    }
}

fn check_complete(trace: &RawEventTrace, scan: &Scan) -> Option<InterpretationWarning> {
    if trace.is_empty() {
        return Some(InterpretationWarning::EmptyTrace);
    }
    let first = scan.visited.first()?;
    if first.state != StateId::WaitForPoke {
        return Some(InterpretationWarning::WrongInitialState {
            expected: StateId::WaitForPoke,
            found: first.state,
        });
    }
    if !scan.ended {
        return Some(InterpretationWarning::MissingTrialEnd);
    }
    None
}

// Outcome follows the terminal branch that was entered.
fn classify(scan: &Scan) -> (Outcome, Option<InterpretationWarning>) {
    if scan.visited.is_empty() {
        return (Outcome::Aborted, Some(InterpretationWarning::NoStates));
    }
    let entered = |id: StateId| scan.visited.iter().any(|v| v.state == id);
    match (entered(StateId::Reward), entered(StateId::Punish)) {
        (true, true) => (
            Outcome::Aborted,
            Some(InterpretationWarning::ConflictingBranches),
        ),
        (true, false) => (Outcome::Reward, None),
        (false, true) => (Outcome::Punish, None),
        // The only exit skipping both branches is the response window timing out.
        (false, false) => match scan.visited.last() {
            Some(last) if last.state == StateId::ResponseWindow => (Outcome::Timeout, None),
            Some(last) => (
                Outcome::Aborted,
                Some(InterpretationWarning::IncompleteTrial(last.state)),
            ),
            None => (Outcome::Aborted, Some(InterpretationWarning::NoStates)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use trialbox_core::{Action, InputEvent, Output, Port};

    fn params() -> TrialParameters {
        ProtocolConfig::default().trial_parameters().unwrap()
    }

    fn ctx(params: &TrialParameters) -> TrialContext<'_> {
        TrialContext {
            index: 4,
            trial_type: TrialType::LeftRewarded,
            parameters: params,
        }
    }

    fn trace(states: &[(&str, f64)], end: Option<f64>) -> RawEventTrace {
        let mut trace = RawEventTrace::new(12.5);
        for (name, at) in states {
            trace.push(
                *at,
                TraceKind::StateEntered {
                    name: name.to_string(),
                },
            );
        }
        if let Some(end) = end {
            trace.push(end, TraceKind::TrialEnd);
        }
        trace
    }

    fn rewarded() -> RawEventTrace {
        let mut t = trace(
            &[
                ("WaitForPoke", 0.0),
                ("Stimulus", 0.5),
                ("StimulusSettle", 0.7),
                ("ResponseWindow", 0.8),
            ],
            None,
        );
        t.push(
            1.1,
            TraceKind::Input {
                event: InputEvent::PortIn(Port::Left),
            },
        );
        t.push(
            1.1,
            TraceKind::StateEntered {
                name: "Reward".into(),
            },
        );
        t.push(
            1.1,
            TraceKind::Output {
                action: Action::Open(Output::Valve(1)),
            },
        );
        t.push(
            1.2,
            TraceKind::StateEntered {
                name: "RewardSettle".into(),
            },
        );
        t.push(1.3, TraceKind::TrialEnd);
        t
    }

    #[test]
    fn classifies_reward_with_visit_times() {
        let p = params();
        let out = interpret(&rewarded(), ctx(&p));
        assert_eq!(out.warning, None);
        let record = out.record;
        assert_eq!(record.outcome, Outcome::Reward);
        assert_eq!(record.index, 4);
        assert_eq!(record.trial_start_timestamp, 12.5);
        assert_eq!(record.visited.len(), 6);
        assert_eq!(record.visited[0].exited_at, 0.5);
        assert_eq!(record.visited[5].state, StateId::RewardSettle);
        assert_eq!(record.visited[5].exited_at, 1.3);
        assert_eq!(record.inputs.len(), 1);
        let rt = record.reaction_time().unwrap();
        assert!((rt - 0.3).abs() < 1e-9);
        assert_eq!(record.parameters, p);
    }

    #[test]
    fn classifies_punish_and_timeout() {
        let p = params();
        let punished = trace(
            &[
                ("WaitForPoke", 0.0),
                ("Stimulus", 0.5),
                ("WithdrawalSettle", 0.6),
                ("Punish", 0.7),
                ("PunishSettle", 3.7),
            ],
            Some(3.8),
        );
        assert_eq!(interpret(&punished, ctx(&p)).record.outcome, Outcome::Punish);

        let timed_out = trace(
            &[
                ("WaitForPoke", 0.0),
                ("Stimulus", 0.5),
                ("StimulusSettle", 0.7),
                ("ResponseWindow", 0.8),
            ],
            Some(2.8),
        );
        let out = interpret(&timed_out, ctx(&p));
        assert_eq!(out.record.outcome, Outcome::Timeout);
        assert_eq!(out.warning, None);
    }

    #[test]
    fn truncated_trace_is_aborted() {
        let p = params();
        let cut = trace(&[("WaitForPoke", 0.0), ("Stimulus", 0.5)], None);
        let out = interpret(&cut, ctx(&p));
        assert_eq!(out.record.outcome, Outcome::Aborted);
        assert_eq!(out.warning, Some(InterpretationWarning::MissingTrialEnd));
        assert_eq!(out.record.visited.len(), 2);
    }

    #[test]
    fn malformed_traces_are_aborted_not_errors() {
        let p = params();
        let cases = [
            (RawEventTrace::new(0.0), InterpretationWarning::EmptyTrace),
            (
                trace(&[("WaitForPoke", 0.0), ("Port1In", 0.4)], Some(1.0)),
                InterpretationWarning::UnknownState("Port1In".into()),
            ),
            (
                trace(&[("Stimulus", 0.0)], Some(1.0)),
                InterpretationWarning::WrongInitialState {
                    expected: StateId::WaitForPoke,
                    found: StateId::Stimulus,
                },
            ),
            (
                trace(&[("WaitForPoke", 1.0), ("Stimulus", 0.5)], Some(2.0)),
                InterpretationWarning::NonMonotonic {
                    previous: 1.0,
                    at: 0.5,
                },
            ),
            (
                trace(
                    &[("WaitForPoke", 0.0), ("Reward", 0.5), ("Punish", 0.6)],
                    Some(1.0),
                ),
                InterpretationWarning::ConflictingBranches,
            ),
            (
                trace(&[("WaitForPoke", 0.0), ("Stimulus", 0.5)], Some(0.6)),
                InterpretationWarning::IncompleteTrial(StateId::Stimulus),
            ),
            (
                trace(
                    &[
                        ("WaitForPoke", 0.0),
                        ("Stimulus", 0.5),
                        ("StimulusSettle", 0.7),
                    ],
                    Some(0.8),
                ),
                InterpretationWarning::IncompleteTrial(StateId::StimulusSettle),
            ),
        ];
        for (raw, expected) in cases {
            let out = interpret(&raw, ctx(&p));
            assert_eq!(out.record.outcome, Outcome::Aborted);
            assert_eq!(out.warning, Some(expected));
        }
    }

    #[test]
    fn replaying_a_trace_gives_identical_records() {
        let p = params();
        let raw = rewarded();
        let a = interpret(&raw, ctx(&p));
        let b = interpret(&raw, ctx(&p));
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_vec(&a.record).unwrap(),
            serde_json::to_vec(&b.record).unwrap()
        );
    }
}
