//! Per-trial state machine construction.
//!
//! Every trial runs the same shape of machine:
//!
//! ```text
//! WaitForPoke --CenterIn--> Stimulus --Tup--> StimulusSettle --Tup--> ResponseWindow
//!                               |                                       |  |  |
//!                           CenterOut                         rewarded  |  |  | Tup
//!                               v                               side In v  |  v
//!                        WithdrawalSettle --Tup--> Punish <--other In---+  |  exit
//!                                                    |          Reward <---+
//!                                                   Tup           | Tup
//!                                                    v            v
//!                                              PunishSettle  RewardSettle --Tup--> exit
//! ```
//!
//! Each state that opens an output is followed, on every exit, by a settle state
//! issuing the matching close.

use std::time::Duration;

use trialbox_core::{
    Action, InputEvent, Output, Port, SideMapping, State, StateId, StateMachineSpec, Target,
    Timeout, TrialParameters, TrialType, Trigger,
};

use crate::error::ConfigurationError;

/// How long a settle state holds after issuing its close action
pub const SETTLE_DURATION: Duration = Duration::from_millis(100);

/// Build the state machine for one trial. Pure and deterministic.
pub fn build_state_machine(
    params: &TrialParameters,
    trial_type: TrialType,
) -> Result<StateMachineSpec, ConfigurationError> {
    let mapping = params
        .valves
        .get(trial_type)
        .ok_or(ConfigurationError::MissingMapping(trial_type))?;
    check_parameters(params)?;
    check_mapping(mapping)?;
    let punished_port = mapping.punished_port().ok_or_else(|| {
        ConfigurationError::invalid("reward_port", "reward port must be a side port")
    })?;

    let stimulus = mapping.stimulus_output;
    let states = vec![
        State::new(StateId::WaitForPoke, Timeout::Infinite).on(
            Trigger::Input(InputEvent::PortIn(Port::Center)),
            Target::State(StateId::Stimulus),
        ),
        State::new(StateId::Stimulus, Timeout::After(params.stimulus_duration))
            .action(Action::Open(stimulus))
            .on(Trigger::Tup, Target::State(StateId::StimulusSettle))
            .on(
                Trigger::Input(InputEvent::PortOut(Port::Center)),
                Target::State(StateId::WithdrawalSettle),
            ),
        settle(
            StateId::StimulusSettle,
            stimulus,
            Target::State(StateId::ResponseWindow),
        ),
        settle(
            StateId::WithdrawalSettle,
            stimulus,
            Target::State(StateId::Punish),
        ),
        State::new(StateId::ResponseWindow, Timeout::After(params.response_window))
            .on(
                Trigger::Input(InputEvent::PortIn(mapping.reward_port)),
                Target::State(StateId::Reward),
            )
            .on(
                Trigger::Input(InputEvent::PortIn(punished_port)),
                Target::State(StateId::Punish),
            )
            .on(Trigger::Tup, Target::Exit),
        State::new(
            StateId::Reward,
            Timeout::After(mapping.valve_time(params.reward_volume_ul)),
        )
        .action(Action::Open(mapping.reward_valve))
        .on(Trigger::Tup, Target::State(StateId::RewardSettle)),
        settle(StateId::RewardSettle, mapping.reward_valve, Target::Exit),
        State::new(StateId::Punish, Timeout::After(params.punishment_duration))
            .action(Action::Open(mapping.punish_output))
            .on(Trigger::Tup, Target::State(StateId::PunishSettle)),
        settle(StateId::PunishSettle, mapping.punish_output, Target::Exit),
    ];

    Ok(StateMachineSpec::new(states)?)
}

fn settle(id: StateId, output: Output, next: Target) -> State {
    State::new(id, Timeout::After(SETTLE_DURATION))
        .action(Action::Close(output))
        .on(Trigger::Tup, next)
}

/// Range checks shared by the builder and config validation.
pub fn check_parameters(params: &TrialParameters) -> Result<(), ConfigurationError> {
    if params.stimulus_duration.is_zero() {
        return Err(ConfigurationError::invalid(
            "stimulus_duration",
            "must be greater than zero",
        ));
    }
    if params.response_window.is_zero() {
        return Err(ConfigurationError::invalid(
            "response_window",
            "must be greater than zero",
        ));
    }
    if params.punishment_duration.is_zero() {
        return Err(ConfigurationError::invalid(
            "punishment_duration",
            "must be greater than zero",
        ));
    }
    if !params.reward_volume_ul.is_finite() || params.reward_volume_ul < 0.0 {
        return Err(ConfigurationError::invalid(
            "reward_volume",
            format!("{} is not a volume >= 0", params.reward_volume_ul),
        ));
    }
    for trial_type in TrialType::ALL {
        if let Some(mapping) = params.valves.get(trial_type) {
            check_mapping(mapping)?;
            if Duration::try_from_secs_f64(params.reward_volume_ul / mapping.valve_ul_per_second)
                .is_err()
            {
                return Err(ConfigurationError::invalid(
                    "reward_volume",
                    format!("valve time for {trial_type} is out of range"),
                ));
            }
        }
    }
    Ok(())
}

fn check_mapping(mapping: &SideMapping) -> Result<(), ConfigurationError> {
    if !mapping.valve_ul_per_second.is_finite() || mapping.valve_ul_per_second <= 0.0 {
        return Err(ConfigurationError::invalid(
            "valve_ul_per_second",
            "calibration must be a positive number",
        ));
    }
    if mapping.reward_port == Port::Center {
        return Err(ConfigurationError::invalid(
            "reward_port",
            "reward port must be a side port",
        ));
    }
    Ok(())
}
