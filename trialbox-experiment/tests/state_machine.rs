use std::collections::BTreeSet;
use std::time::Duration;

use proptest::prelude::*;
use trialbox_core::{
    Output, StateId, StateMachineSpec, Target, TraceKind, TrialParameters, TrialType,
};
use trialbox_experiment::{
    HardwareExecutor, ProtocolConfig, Response, ScriptedSubject, SimulatedBox, TrialContext,
    build_state_machine, interpret,
};
use trialbox_timing::ManualTimer;

fn params(stimulus: f64, volume: f64, window: f64, punish: f64) -> TrialParameters {
    ProtocolConfig {
        stimulus_duration_seconds: stimulus,
        reward_volume_microliters: volume,
        response_window_seconds: window,
        punishment_duration_seconds: punish,
        ..ProtocolConfig::default()
    }
    .trial_parameters()
    .unwrap()
}

// Every path out of `from` reaches a state closing `output` through finite states.
fn closed_on_all_paths(spec: &StateMachineSpec, from: StateId, output: Output) -> bool {
    let mut seen = BTreeSet::new();
    let mut frontier: Vec<Target> = spec
        .state(from)
        .unwrap()
        .transitions
        .values()
        .copied()
        .collect();
    while let Some(target) = frontier.pop() {
        let Target::State(id) = target else {
            return false;
        };
        let state = spec.state(id).unwrap();
        if state.closes(output) {
            continue;
        }
        if !state.timeout.is_finite() || !seen.insert(id) {
            return false;
        }
        frontier.extend(state.transitions.values().copied());
    }
    true
}

fn response() -> impl Strategy<Value = Response> {
    prop_oneof![
        Just(Response::Correct),
        Just(Response::Wrong),
        Just(Response::NoResponse),
        Just(Response::EarlyWithdrawal),
    ]
}

fn trial_type() -> impl Strategy<Value = TrialType> {
    prop_oneof![Just(TrialType::LeftRewarded), Just(TrialType::RightRewarded)]
}

proptest! {
    #[test]
    fn every_opened_output_is_closed(
        stimulus in 0.01f64..5.0,
        volume in 0.0f64..50.0,
        window in 0.05f64..10.0,
        punish in 0.05f64..10.0,
        trial_type in trial_type(),
    ) {
        let params = params(stimulus, volume, window, punish);
        let spec = build_state_machine(&params, trial_type).unwrap();
        for state in spec.states() {
            for output in state.opens() {
                prop_assert!(state.timeout.is_finite());
                prop_assert!(
                    closed_on_all_paths(&spec, state.id, output),
                    "{output} opened in {} can stay open", state.id
                );
            }
        }
    }

    #[test]
    fn building_is_deterministic(
        stimulus in 0.01f64..5.0,
        volume in 0.0f64..50.0,
        trial_type in trial_type(),
    ) {
        let params = params(stimulus, volume, 2.0, 3.0);
        prop_assert_eq!(
            build_state_machine(&params, trial_type).unwrap(),
            build_state_machine(&params, trial_type).unwrap()
        );
    }

    #[test]
    fn simulated_trials_classify_as_expected(
        response in response(),
        trial_type in trial_type(),
        volume in 0.0f64..50.0,
    ) {
        let params = params(0.2, volume, 2.0, 3.0);
        let spec = build_state_machine(&params, trial_type).unwrap();
        let mut sim = SimulatedBox::new(ScriptedSubject::new([response]), ManualTimer::new());
        let handle = sim.send(&spec).unwrap();
        let trace = sim.run(handle).unwrap().unwrap();

        let actions = trace
            .entries
            .iter()
            .filter(|e| matches!(e.kind, TraceKind::Output { .. }))
            .count();
        prop_assert_eq!(actions % 2, 0);

        let ctx = TrialContext { index: 0, trial_type, parameters: &params };
        let first = interpret(&trace, ctx);
        prop_assert!(first.warning.is_none());
        let expected = match response {
            Response::Correct => trialbox_core::Outcome::Reward,
            Response::Wrong | Response::EarlyWithdrawal => trialbox_core::Outcome::Punish,
            Response::NoResponse => trialbox_core::Outcome::Timeout,
        };
        prop_assert_eq!(first.record.outcome, expected);
        prop_assert_eq!(interpret(&trace, ctx), first);
    }
}

#[test]
fn reward_valve_time_matches_calibration() {
    let params = params(0.2, 3.0, 2.0, 3.0);
    let spec = build_state_machine(&params, TrialType::LeftRewarded).unwrap();
    let reward = spec.state(StateId::Reward).unwrap();
    assert_eq!(reward.timeout.duration(), Some(Duration::from_millis(100)));
}

#[test]
fn zero_reward_volume_still_closes_the_valve() {
    let params = params(0.2, 0.0, 2.0, 3.0);
    let spec = build_state_machine(&params, TrialType::RightRewarded).unwrap();
    let reward = spec.state(StateId::Reward).unwrap();
    assert_eq!(reward.timeout.duration(), Some(Duration::ZERO));
    assert!(closed_on_all_paths(&spec, StateId::Reward, Output::Valve(3)));

    let mut sim = SimulatedBox::new(ScriptedSubject::new([Response::Correct]), ManualTimer::new());
    let handle = sim.send(&spec).unwrap();
    let trace = sim.run(handle).unwrap().unwrap();
    let ctx = TrialContext {
        index: 0,
        trial_type: TrialType::RightRewarded,
        parameters: &params,
    };
    assert_eq!(interpret(&trace, ctx).record.outcome, trialbox_core::Outcome::Reward);
}
