use serde::Serialize;
use thiserror::Error;

use crate::model::SubmitTrigger;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Illegal countdown transitions.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimerError {
    #[error("countdown has already been started")]
    AlreadyStarted,

    #[error("countdown has not been started")]
    NotStarted,

    #[error("a submission is already in flight")]
    SubmissionInFlight,

    #[error("the exam has already been submitted")]
    AlreadySubmitted,

    #[error("countdown has not expired")]
    NotExpired,
}

//
// ─── SEVERITY ──────────────────────────────────────────────────────────────────
//

/// Advisory urgency level shown next to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// More than ten minutes left.
    Normal,
    /// Ten minutes or less.
    Caution,
    /// Five minutes or less.
    Warning,
    /// Two minutes or less.
    Critical,
}

impl Severity {
    #[must_use]
    pub fn from_remaining(remaining_secs: u32) -> Self {
        match remaining_secs {
            0..=120 => Severity::Critical,
            121..=300 => Severity::Warning,
            301..=600 => Severity::Caution,
            _ => Severity::Normal,
        }
    }
}

/// Renders seconds as `m:ss`.
#[must_use]
pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// What the display surface receives on each tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerUpdate {
    pub remaining_secs: u32,
    pub severity: Severity,
    pub display: String,
}

impl TimerUpdate {
    #[must_use]
    pub fn new(remaining_secs: u32) -> Self {
        Self {
            remaining_secs,
            severity: Severity::from_remaining(remaining_secs),
            display: format_clock(remaining_secs),
        }
    }
}

//
// ─── COUNTDOWN ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No deadline yet.
    Uninitialized,
    /// Counting down.
    Running,
    /// A manual submission has been claimed and is awaiting its outcome.
    Submitting,
    /// Reached zero; the forced submission has not been claimed yet.
    Expiring,
    AutoSubmitted,
    ManuallySubmitted,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Running(TimerUpdate),
    /// Remaining time just hit zero. Emitted once.
    Expired,
    /// The countdown is not running; nothing changed.
    Idle,
}

/// Countdown state machine and one-shot submission guard.
///
/// Only the transitions `Running -> Submitting` (manual) and
/// `Expiring -> AutoSubmitted` (expiry) hand out the right to submit, and
/// neither can happen twice, so at most one submission leaves a session no
/// matter how a manual click and the final tick interleave.
#[derive(Debug, Clone)]
pub struct Countdown {
    state: TimerState,
    duration_secs: u32,
    remaining_secs: u32,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Countdown {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: TimerState::Uninitialized,
            duration_secs: 0,
            remaining_secs: 0,
        }
    }

    /// Arm the countdown, accounting for time already spent in a resumed attempt.
    ///
    /// Returns `Tick::Expired` when the attempt is already out of time.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::AlreadyStarted` if called more than once.
    pub fn start(&mut self, duration_secs: u32, elapsed_secs: u32) -> Result<Tick, TimerError> {
        if self.state != TimerState::Uninitialized {
            return Err(TimerError::AlreadyStarted);
        }
        self.duration_secs = duration_secs;
        self.remaining_secs = duration_secs.saturating_sub(elapsed_secs);

        if self.remaining_secs == 0 {
            self.state = TimerState::Expiring;
            return Ok(Tick::Expired);
        }
        self.state = TimerState::Running;
        Ok(Tick::Running(TimerUpdate::new(self.remaining_secs)))
    }

    /// Advance by one second.
    pub fn tick(&mut self) -> Tick {
        if self.state != TimerState::Running {
            return Tick::Idle;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.state = TimerState::Expiring;
            return Tick::Expired;
        }
        Tick::Running(TimerUpdate::new(self.remaining_secs))
    }

    /// Claim the single right to submit.
    ///
    /// # Errors
    ///
    /// Returns a `TimerError` describing why the claim is refused; a refused
    /// claim leaves the state untouched.
    pub fn claim(&mut self, trigger: SubmitTrigger) -> Result<(), TimerError> {
        match (trigger, self.state) {
            (SubmitTrigger::Manual, TimerState::Running) => {
                self.state = TimerState::Submitting;
                Ok(())
            }
            (SubmitTrigger::Expiry, TimerState::Expiring) => {
                self.state = TimerState::AutoSubmitted;
                Ok(())
            }
            (_, TimerState::Uninitialized) => Err(TimerError::NotStarted),
            (_, TimerState::Submitting) => Err(TimerError::SubmissionInFlight),
            (SubmitTrigger::Expiry, TimerState::Running) => Err(TimerError::NotExpired),
            (
                _,
                TimerState::Expiring | TimerState::AutoSubmitted | TimerState::ManuallySubmitted,
            ) => Err(TimerError::AlreadySubmitted),
        }
    }

    /// Settle a manual claim. A failed submission resumes the countdown where
    /// it stopped.
    pub fn settle_manual(&mut self, succeeded: bool) {
        if self.state != TimerState::Submitting {
            return;
        }
        self.state = if succeeded {
            TimerState::ManuallySubmitted
        } else {
            TimerState::Running
        };
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        self.state
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.duration_secs.saturating_sub(self.remaining_secs)
    }

    /// True once no further submission can happen.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            TimerState::AutoSubmitted | TimerState::ManuallySubmitted
        )
    }
}
