//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{AnswerError, QuestionIndex};
use exam_core::timer::TimerError;
use storage::repository::StorageError;

/// Errors emitted while starting or driving an exam session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("failed to load exam: {0}")]
    ExamLoad(#[source] StorageError),

    #[error("failed to load saved progress: {0}")]
    ProgressLoad(#[source] StorageError),

    #[error("saved progress does not fit this exam: {0}")]
    MalformedProgress(String),

    #[error("question {0} does not exist")]
    UnknownQuestion(QuestionIndex),

    #[error("question {index} has unsupported type \"{tag}\"")]
    UnsupportedQuestionType { index: QuestionIndex, tag: String },

    #[error("the session has ended")]
    Finished,

    #[error(transparent)]
    Answer(#[from] AnswerError),

    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Errors emitted by the submission workflow.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmitError {
    #[error("submission requires confirmation")]
    NotConfirmed,

    #[error(transparent)]
    Rejected(#[from] TimerError),

    #[error("submission failed: {0}")]
    Collaborator(#[source] StorageError),
}
