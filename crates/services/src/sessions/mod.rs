mod answers;
mod navigation;
mod persistence;
mod runner;
mod service;
mod submission;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::{SessionError, SubmitError};
pub use answers::{AnswerStore, WritingProgress};
pub use navigation::{NavigationTracker, QuestionStatus};
pub use persistence::ProgressAdapter;
pub use runner::{SessionCommand, SessionEvent, SessionRunner};
pub use service::{ExamSession, SessionStatus};
pub use submission::{SubmissionWorkflow, submitter_for};
pub use workflow::SessionLoopService;
