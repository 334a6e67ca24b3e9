use std::time::Duration;

use trialbox_core::{SessionStatus, Signal, TrialParameters, TrialRecord};
use trialbox_timing::Timer;

use crate::adaptive::{AdaptiveController, AdaptiveState};
use crate::builder::build_state_machine;
use crate::config::ProtocolConfig;
use crate::control::SessionControl;
use crate::error::{ConfigurationError, Result, SessionError};
use crate::executor::HardwareExecutor;
use crate::interpreter::{Interpretation, TrialContext, interpret};
use crate::params::ParameterSource;
use crate::recorder::{SessionData, SessionHeader, SessionRecorder};
use crate::schedule::TypeScheduler;

/// How often a paused session re-reads its control flags
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    StopSignal,
    TrialLimit,
    Fatal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub trials_completed: usize,
    pub aborted_trials: usize,
    pub interrupted_runs: usize,
    pub adaptive: AdaptiveState,
    pub stop_reason: Option<StopReason>,
}

/// Drives trials one after another until stopped.
///
/// Owns every piece of per-session state. Pause and stop are only honored between
/// trials; a trial handed to the executor always runs to its end.
pub struct SessionLoop<E, P, T>
where
    E: HardwareExecutor,
    P: ParameterSource,
    T: Timer,
{
    status: SessionStatus,
    executor: E,
    parameters: P,
    timer: T,
    control: SessionControl,
    recorder: SessionRecorder,
    controller: AdaptiveController,
    scheduler: TypeScheduler,
    adaptive: AdaptiveState,
    current: TrialParameters,
    data: SessionData,
    max_trials: Option<usize>,
    inter_trial_interval: Duration,
    pause_poll_interval: Duration,
    aborted_trials: usize,
    interrupted_runs: usize,
    stop_reason: Option<StopReason>,
}

impl<E, P, T> SessionLoop<E, P, T>
where
    E: HardwareExecutor,
    P: ParameterSource,
    T: Timer,
{
    pub fn new(
        config: &ProtocolConfig,
        executor: E,
        parameters: P,
        recorder: SessionRecorder,
        timer: T,
    ) -> Result<Self> {
        config.validate()?;
        check_header(config, recorder.header())?;
        let data = SessionData::new(recorder.header().clone());
        Ok(Self {
            status: SessionStatus::default(),
            executor,
            parameters,
            timer,
            control: SessionControl::new(),
            recorder,
            controller: AdaptiveController::new(config.switch_threshold)?,
            scheduler: TypeScheduler::from_config(config),
            adaptive: AdaptiveState::new(config.initial_trial_type),
            current: config.trial_parameters()?,
            data,
            max_trials: config.max_trials,
            inter_trial_interval: config.inter_trial_interval()?,
            pause_poll_interval: PAUSE_POLL_INTERVAL,
            aborted_trials: 0,
            interrupted_runs: 0,
            stop_reason: None,
        })
    }

    /// Use an externally created control handle, e.g. one shared with the executor.
    pub fn with_control(mut self, control: SessionControl) -> Self {
        self.control = control;
        self
    }

    /// Continue after trials already persisted by a reopened recorder.
    ///
    /// The adaptive state is rebuilt by replaying the recorded outcomes under the
    /// store's recorded rule, which `new` has already matched against the config.
    pub fn with_history(mut self, trials: Vec<TrialRecord>) -> Result<Self> {
        if trials.len() != self.recorder.len() {
            return Err(crate::error::PersistenceError::OutOfOrder {
                expected: self.recorder.len(),
                got: trials.len(),
            }
            .into());
        }
        self.adaptive = self
            .controller
            .replay(self.adaptive, trials.iter().map(|t| t.outcome));
        for trial in &trials {
            self.scheduler.commit(trial.trial_type);
        }
        if let Some(last) = trials.last() {
            self.current = last.parameters.clone();
        }
        self.data.trials = trials;
        Ok(self)
    }

    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn adaptive_state(&self) -> AdaptiveState {
        self.adaptive
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            trials_completed: self.data.len(),
            aborted_trials: self.aborted_trials,
            interrupted_runs: self.interrupted_runs,
            adaptive: self.adaptive,
            stop_reason: self.stop_reason,
        }
    }

    /// Step until the session stops.
    pub fn run(&mut self) -> Result<SessionReport> {
        tracing::info!(
            subject = %self.data.header.subject,
            protocol = %self.data.header.protocol,
            max_trials = ?self.max_trials,
            "session started"
        );
        while !self.status.is_terminal() {
            self.step()?;
        }
        let report = self.report();
        tracing::info!(
            trials = report.trials_completed,
            reason = ?report.stop_reason,
            "session finished"
        );
        Ok(report)
    }

    /// Advance the session by one trial, or one pause poll while paused.
    pub fn step(&mut self) -> Result<SessionStatus> {
        match self.status {
            SessionStatus::Stopped => return Ok(self.status),
            SessionStatus::Paused => {
                if self.control.stop_requested() {
                    self.stop(Signal::Stop);
                } else if self.limit_reached() {
                    self.stop(Signal::TrialLimit);
                } else if !self.control.pause_requested() {
                    self.transition(Signal::Resume);
                } else {
                    self.timer.sleep(self.pause_poll_interval);
                }
                return Ok(self.status);
            }
            SessionStatus::Running => {}
        }

        if self.control.stop_requested() {
            self.stop(Signal::Stop);
            return Ok(self.status);
        }
        if self.limit_reached() {
            self.stop(Signal::TrialLimit);
            return Ok(self.status);
        }
        if self.control.pause_requested() {
            self.transition(Signal::Pause);
            return Ok(self.status);
        }

        if let Err(e) = self.run_trial() {
            self.status = SessionStatus::Stopped;
            self.stop_reason = Some(StopReason::Fatal);
            tracing::error!(error = %e, trials = self.data.len(), "session stopped on fatal error");
            return Err(e);
        }

        if self.control.stop_requested() {
            self.stop(Signal::Stop);
        } else if self.limit_reached() {
            self.stop(Signal::TrialLimit);
        } else if self.control.pause_requested() {
            self.transition(Signal::Pause);
        }
        Ok(self.status)
    }

    fn run_trial(&mut self) -> Result<(), SessionError> {
        if let Some(params) = self.parameters.poll() {
            tracing::info!("trial parameters updated");
            self.current = params;
        }

        let index = self.data.len();
        let trial_type = self.scheduler.next_type(&self.adaptive);
        let spec = build_state_machine(&self.current, trial_type)?;

        tracing::info!(trial = index, %trial_type, "trial started");
        let handle = self.executor.send(&spec)?;
        let Some(trace) = self.executor.run(handle)? else {
            self.interrupted_runs += 1;
            tracing::info!(trial = index, "trial interrupted, nothing recorded");
            return Ok(());
        };

        let Interpretation { record, warning } = interpret(
            &trace,
            TrialContext {
                index,
                trial_type,
                parameters: &self.current,
            },
        );
        if warning.is_some() {
            self.aborted_trials += 1;
        }
        let next = self.controller.update(self.adaptive, record.outcome);
        self.recorder.append(&record)?;

        self.adaptive = next;
        self.scheduler.commit(trial_type);
        tracing::info!(
            trial = index,
            outcome = %record.outcome,
            streak = next.consecutive_rewards,
            next_type = %next.current_type,
            "trial recorded"
        );
        self.data.trials.push(record);

        self.timer.sleep(self.inter_trial_interval);
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.max_trials.is_some_and(|max| self.data.len() >= max)
    }

    fn transition(&mut self, signal: Signal) {
        let next = self.status.next(signal);
        if next != self.status {
            tracing::info!(from = ?self.status, to = ?next, ?signal, "session status changed");
            self.status = next;
        }
    }

    fn stop(&mut self, signal: Signal) {
        self.transition(signal);
        if self.status.is_terminal() && self.stop_reason.is_none() {
            self.stop_reason = Some(match signal {
                Signal::TrialLimit => StopReason::TrialLimit,
                _ => StopReason::StopSignal,
            });
        }
    }
}

// A store keeps the rule that produced its schedule; continuing it under another
// rule would replay the history into a state the session never had.
fn check_header(
    config: &ProtocolConfig,
    header: &SessionHeader,
) -> Result<(), ConfigurationError> {
    let mismatch = |field: &'static str, recorded: String, configured: String| {
        ConfigurationError::HeaderMismatch {
            field,
            recorded,
            configured,
        }
    };
    if header.switch_threshold != config.switch_threshold {
        return Err(mismatch(
            "switch_threshold",
            header.switch_threshold.to_string(),
            config.switch_threshold.to_string(),
        ));
    }
    if header.schedule != config.schedule {
        return Err(mismatch(
            "schedule",
            format!("{:?}", header.schedule),
            format!("{:?}", config.schedule),
        ));
    }
    if header.initial_trial_type != config.initial_trial_type {
        return Err(mismatch(
            "initial_trial_type",
            header.initial_trial_type.to_string(),
            config.initial_trial_type.to_string(),
        ));
    }
    Ok(())
}
