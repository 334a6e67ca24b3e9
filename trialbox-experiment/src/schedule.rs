use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trialbox_core::TrialType;

use crate::adaptive::AdaptiveState;
use crate::config::{ProtocolConfig, ScheduleMode};

/// Picks the trial type for the next trial.
///
/// A choice stays pending until `commit`, so a trial that produced no record is
/// retried with the same type.
#[derive(Debug, Clone)]
pub struct TypeScheduler {
    mode: Mode,
    pending: Option<TrialType>,
}

#[derive(Debug, Clone)]
enum Mode {
    Adaptive,
    Fixed(TrialType),
    Randomized {
        rng: StdRng,
        max_run: usize,
        run: Option<(TrialType, usize)>,
    },
}

impl TypeScheduler {
    pub fn adaptive() -> Self {
        Self::with_mode(Mode::Adaptive)
    }

    pub fn fixed(trial_type: TrialType) -> Self {
        Self::with_mode(Mode::Fixed(trial_type))
    }

    pub fn randomized(seed: u64, max_run: usize) -> Self {
        Self::with_mode(Mode::Randomized {
            rng: StdRng::seed_from_u64(seed),
            max_run: max_run.max(1),
            run: None,
        })
    }

    pub fn from_config(config: &ProtocolConfig) -> Self {
        match config.schedule {
            ScheduleMode::Adaptive => Self::adaptive(),
            ScheduleMode::Fixed => Self::fixed(config.initial_trial_type),
            ScheduleMode::Randomized => Self::randomized(config.seed, config.max_same_type_run),
        }
    }

    fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            pending: None,
        }
    }

    pub fn next_type(&mut self, adaptive: &AdaptiveState) -> TrialType {
        if let Some(pending) = self.pending {
            return pending;
        }
        let chosen = match &mut self.mode {
            Mode::Adaptive => adaptive.current_type,
            Mode::Fixed(trial_type) => *trial_type,
            Mode::Randomized { rng, max_run, run } => match run {
                Some((last, count)) if *count >= *max_run => last.flip(),
                _ => {
                    if rng.random_bool(0.5) {
                        TrialType::LeftRewarded
                    } else {
                        TrialType::RightRewarded
                    }
                }
            },
        };
        self.pending = Some(chosen);
        chosen
    }

    /// Record that a trial of `trial_type` was completed.
    pub fn commit(&mut self, trial_type: TrialType) {
        self.pending = None;
        if let Mode::Randomized { run, .. } = &mut self.mode {
            *run = match *run {
                Some((last, count)) if last == trial_type => Some((trial_type, count + 1)),
                _ => Some((trial_type, 1)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_follows_controller_state() {
        let mut s = TypeScheduler::adaptive();
        let state = AdaptiveState::new(TrialType::RightRewarded);
        assert_eq!(s.next_type(&state), TrialType::RightRewarded);
    }

    #[test]
    fn uncommitted_choice_is_repeated() {
        let mut s = TypeScheduler::randomized(11, 3);
        let state = AdaptiveState::new(TrialType::LeftRewarded);
        let first = s.next_type(&state);
        assert_eq!(s.next_type(&state), first);
    }

    #[test]
    fn randomized_caps_same_type_runs() {
        let mut s = TypeScheduler::randomized(3, 2);
        let state = AdaptiveState::new(TrialType::LeftRewarded);
        let mut run = 0;
        let mut last = None;
        for _ in 0..500 {
            let t = s.next_type(&state);
            s.commit(t);
            run = if last == Some(t) { run + 1 } else { 1 };
            last = Some(t);
            assert!(run <= 2);
        }
    }

    #[test]
    fn randomized_is_reproducible() {
        let state = AdaptiveState::new(TrialType::LeftRewarded);
        let draw = |seed| {
            let mut s = TypeScheduler::randomized(seed, 3);
            (0..40)
                .map(|_| {
                    let t = s.next_type(&state);
                    s.commit(t);
                    t
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
    }
}
