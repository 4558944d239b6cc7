#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;

pub use exam_core::Clock;
pub use sessions as session;

pub use error::{SessionError, SubmitError};

pub use sessions::{
    AnswerStore, ExamSession, NavigationTracker, ProgressAdapter, QuestionStatus, SessionCommand,
    SessionEvent, SessionLoopService, SessionRunner, SessionStatus, SubmissionWorkflow,
    WritingProgress,
};
