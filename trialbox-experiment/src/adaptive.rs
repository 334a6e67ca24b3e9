use serde::{Deserialize, Serialize};
use trialbox_core::{Outcome, TrialType};

use crate::error::ConfigurationError;

/// Reward streak and active block type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveState {
    pub consecutive_rewards: u32,
    pub current_type: TrialType,
}

impl AdaptiveState {
    pub fn new(initial_type: TrialType) -> Self {
        Self {
            consecutive_rewards: 0,
            current_type: initial_type,
        }
    }
}

/// Block-switching rule.
///
/// Reward extends the streak and flips the type once the streak reaches
/// `threshold`. Punish breaks the streak. Timeout and Aborted leave everything
/// as it was.
pub fn advance(
    outcome: Outcome,
    current_type: TrialType,
    counter: u32,
    threshold: u32,
) -> (u32, TrialType) {
    match outcome {
        Outcome::Reward => {
            let streak = counter.saturating_add(1);
            if streak >= threshold {
                (0, current_type.flip())
            } else {
                (streak, current_type)
            }
        }
        Outcome::Punish => (0, current_type),
        Outcome::Timeout | Outcome::Aborted => (counter, current_type),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveController {
    threshold: u32,
}

impl AdaptiveController {
    pub fn new(threshold: u32) -> Result<Self, ConfigurationError> {
        if threshold < 1 {
            return Err(ConfigurationError::invalid(
                "switch_threshold",
                "must be at least 1",
            ));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn update(&self, state: AdaptiveState, outcome: Outcome) -> AdaptiveState {
        let (consecutive_rewards, current_type) = advance(
            outcome,
            state.current_type,
            state.consecutive_rewards,
            self.threshold,
        );
        if current_type != state.current_type {
            tracing::info!(from = %state.current_type, to = %current_type, "block switch");
        }
        AdaptiveState {
            consecutive_rewards,
            current_type,
        }
    }

    /// Rebuild the state reached after `outcomes`, e.g. when resuming a session.
    pub fn replay(
        &self,
        initial: AdaptiveState,
        outcomes: impl IntoIterator<Item = Outcome>,
    ) -> AdaptiveState {
        outcomes
            .into_iter()
            .fold(initial, |state, outcome| self.update(state, outcome))
    }
}
