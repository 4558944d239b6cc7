mod answer;
mod exam;
mod ids;
mod progress;
mod submission;

pub use answer::{
    AnswerError, AnswerPatch, AnswerShape, AnswerValue, MAX_BLANKS, PatchOutcome, word_count,
};
pub use exam::{Exam, ExamCategory, ExamError, Question, Section};
pub use ids::{ExamId, ParseIdError, QuestionIndex, SessionScope, UserId};
pub use progress::SessionProgress;
pub use submission::{SubmitTrigger, Submission};
