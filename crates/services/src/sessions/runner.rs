use std::time::Duration;

use exam_core::model::{AnswerPatch, PatchOutcome, QuestionIndex, SubmitTrigger};
use exam_core::timer::{Tick, TimerState, TimerUpdate};
use storage::repository::SubmissionId;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::service::{ExamSession, SessionStatus};
use crate::error::SubmitError;

const TICK: Duration = Duration::from_secs(1);

/// Input from the test-taker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Answer {
        index: QuestionIndex,
        patch: AnswerPatch,
    },
    GoTo(QuestionIndex),
    Next,
    Previous,
    /// `None` marks the current question.
    ToggleReview(Option<QuestionIndex>),
    Submit {
        confirmed: bool,
    },
    Status,
}

/// Output for the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Timer(TimerUpdate),
    Answered {
        index: QuestionIndex,
        outcome: PatchOutcome,
    },
    Moved {
        current: QuestionIndex,
        part: Option<u32>,
    },
    ReviewToggled {
        index: QuestionIndex,
        marked: bool,
    },
    Status(SessionStatus),
    /// A command that changed nothing, with the reason.
    Rejected(String),
    /// Manual submission was asked for without confirmation.
    ConfirmationRequired,
    Submitted {
        id: SubmissionId,
        trigger: SubmitTrigger,
    },
    SubmissionFailed {
        trigger: SubmitTrigger,
        reason: String,
    },
}

/// Drives one session on a single task: a one-second ticker and the command
/// channel are polled in turn, so ticks and commands never interleave inside
/// a transition.
///
/// Ticks missed while a command was awaiting a collaborator are replayed in a
/// burst, so the countdown keeps to wall-clock time.
pub struct SessionRunner {
    session: ExamSession,
    events: mpsc::Sender<SessionEvent>,
}

impl SessionRunner {
    #[must_use]
    pub fn new(session: ExamSession, events: mpsc::Sender<SessionEvent>) -> Self {
        Self { session, events }
    }

    /// Run until the session is submitted or the command channel closes.
    ///
    /// On close the current snapshot is saved once more so the attempt can be
    /// resumed. The session is handed back either way.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> ExamSession {
        if self.session.timer_state() == TimerState::Expiring {
            self.expire().await;
            return self.session;
        }

        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            tokio::select! {
                // a tick that is due wins over a command in the same turn
                biased;

                _ = ticker.tick() => {
                    match self.session.tick() {
                        Tick::Running(update) => self.emit(SessionEvent::Timer(update)).await,
                        Tick::Expired => self.expire().await,
                        Tick::Idle => {}
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.session.checkpoint().await;
                        break;
                    };
                    self.handle(command).await;
                }
            }

            if self.session.is_finished() {
                break;
            }
        }
        self.session
    }

    async fn expire(&mut self) {
        self.emit(SessionEvent::Timer(TimerUpdate::new(0))).await;
        let event = match self.session.auto_submit().await {
            Ok(id) => SessionEvent::Submitted {
                id,
                trigger: SubmitTrigger::Expiry,
            },
            Err(err) => SessionEvent::SubmissionFailed {
                trigger: SubmitTrigger::Expiry,
                reason: err.to_string(),
            },
        };
        self.emit(event).await;
    }

    async fn handle(&mut self, command: SessionCommand) {
        let event = match command {
            SessionCommand::Answer { index, patch } => {
                match self.session.set_answer(index, patch) {
                    Ok(outcome) => SessionEvent::Answered { index, outcome },
                    Err(err) => SessionEvent::Rejected(err.to_string()),
                }
            }
            SessionCommand::GoTo(index) => {
                let result = self.session.go_to(index);
                self.moved(result)
            }
            SessionCommand::Next => {
                let result = self.session.next();
                self.moved(result)
            }
            SessionCommand::Previous => {
                let result = self.session.previous();
                self.moved(result)
            }
            SessionCommand::ToggleReview(target) => {
                let index = target.unwrap_or_else(|| self.session.current_index());
                match self.session.toggle_review(index) {
                    Ok(marked) => SessionEvent::ReviewToggled { index, marked },
                    Err(err) => SessionEvent::Rejected(err.to_string()),
                }
            }
            SessionCommand::Submit { confirmed } => match self.session.submit(confirmed).await {
                Ok(id) => SessionEvent::Submitted {
                    id,
                    trigger: SubmitTrigger::Manual,
                },
                Err(SubmitError::NotConfirmed) => SessionEvent::ConfirmationRequired,
                Err(err @ SubmitError::Collaborator(_)) => SessionEvent::SubmissionFailed {
                    trigger: SubmitTrigger::Manual,
                    reason: err.to_string(),
                },
                Err(err) => SessionEvent::Rejected(err.to_string()),
            },
            SessionCommand::Status => SessionEvent::Status(self.session.status()),
        };
        self.emit(event).await;
    }

    fn moved(&self, result: Result<bool, crate::error::SessionError>) -> SessionEvent {
        match result {
            Ok(true) => SessionEvent::Moved {
                current: self.session.current_index(),
                part: self.session.current_part(),
            },
            Ok(false) => SessionEvent::Rejected("no such question".into()),
            Err(err) => SessionEvent::Rejected(err.to_string()),
        }
    }

    async fn emit(&self, event: SessionEvent) {
        // the display may have gone away; the session keeps running
        let _ = self.events.send(event).await;
    }
}
