use std::collections::BTreeMap;
use std::fmt;

use trialbox_core::{Outcome, TrialRecord, TrialType};

/// Per-session counts over persisted trials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub trials: usize,
    pub per_type: BTreeMap<TrialType, usize>,
    pub rewards: usize,
    pub punishments: usize,
    pub timeouts: usize,
    pub aborted: usize,
}

impl SessionSummary {
    pub fn from_records(records: &[TrialRecord]) -> Self {
        let mut summary = Self {
            trials: records.len(),
            ..Self::default()
        };
        for record in records {
            *summary.per_type.entry(record.trial_type).or_default() += 1;
            match record.outcome {
                Outcome::Reward => summary.rewards += 1,
                Outcome::Punish => summary.punishments += 1,
                Outcome::Timeout => summary.timeouts += 1,
                Outcome::Aborted => summary.aborted += 1,
            }
        }
        summary
    }

    /// Share of all trials, in percent. Zero for an empty session.
    pub fn percent(&self, count: usize) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.trials as f64
        }
    }

    pub fn type_count(&self, trial_type: TrialType) -> usize {
        self.per_type.get(&trial_type).copied().unwrap_or(0)
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "trials:       {}", self.trials)?;
        for trial_type in TrialType::ALL {
            let n = self.type_count(trial_type);
            writeln!(f, "{:<14}{:>5} ({:.1}%)", format!("{trial_type}:"), n, self.percent(n))?;
        }
        for (label, n) in [
            ("rewards:", self.rewards),
            ("punishments:", self.punishments),
            ("timeouts:", self.timeouts),
            ("aborted:", self.aborted),
        ] {
            writeln!(f, "{label:<14}{n:>5} ({:.1}%)", self.percent(n))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;

    fn record(index: usize, trial_type: TrialType, outcome: Outcome) -> TrialRecord {
        TrialRecord {
            index,
            trial_type,
            trial_start_timestamp: 0.0,
            visited: vec![],
            inputs: vec![],
            outcome,
            parameters: ProtocolConfig::default().trial_parameters().unwrap(),
        }
    }

    #[test]
    fn counts_and_percentages() {
        let records = vec![
            record(0, TrialType::LeftRewarded, Outcome::Reward),
            record(1, TrialType::LeftRewarded, Outcome::Punish),
            record(2, TrialType::RightRewarded, Outcome::Reward),
            record(3, TrialType::RightRewarded, Outcome::Timeout),
        ];
        let s = SessionSummary::from_records(&records);
        assert_eq!(s.trials, 4);
        assert_eq!(s.rewards, 2);
        assert_eq!(s.punishments, 1);
        assert_eq!(s.timeouts, 1);
        assert_eq!(s.aborted, 0);
        assert_eq!(s.type_count(TrialType::RightRewarded), 2);
        assert_eq!(s.percent(s.rewards), 50.0);
        assert!(s.to_string().contains("rewards:"));
    }

    #[test]
    fn empty_session_has_zero_percentages() {
        let s = SessionSummary::from_records(&[]);
        assert_eq!(s.percent(0), 0.0);
    }
}
