use serde::{Deserialize, Serialize};

/// Lifecycle of a session. Transitions are only taken at trial boundaries.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Running,
    Paused,
    Stopped,
}

/// External or internal reasons to change status
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Pause,
    Resume,
    Stop,
    TrialLimit,
}

impl SessionStatus {
    pub fn allows_trials(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    pub fn next(&self, signal: Signal) -> SessionStatus {
        use SessionStatus::*;
        match (self, signal) {
            (Stopped, _) => Stopped,
            (_, Signal::Stop) => Stopped,
            (Running, Signal::Pause) => Paused,
            (_, Signal::TrialLimit) => Stopped,
            (Paused, Signal::Resume) => Running,
            (status, _) => *status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_resume_cycle() {
        let s = SessionStatus::default();
        assert!(s.allows_trials());
        let s = s.next(Signal::Pause);
        assert_eq!(s, SessionStatus::Paused);
        assert!(!s.allows_trials());
        assert_eq!(s.next(Signal::Resume), SessionStatus::Running);
    }

    #[test]
    fn stopped_is_terminal() {
        let s = SessionStatus::Paused.next(Signal::Stop);
        assert!(s.is_terminal());
        assert_eq!(s.next(Signal::Resume), SessionStatus::Stopped);
        assert_eq!(
            SessionStatus::Running.next(Signal::TrialLimit),
            SessionStatus::Stopped
        );
        assert_eq!(
            SessionStatus::Paused.next(Signal::TrialLimit),
            SessionStatus::Stopped
        );
    }
}
