use std::collections::BTreeMap;
use std::sync::Arc;

use exam_core::Clock;
use exam_core::model::{
    AnswerValue, Exam, QuestionIndex, SessionScope, Submission, SubmitTrigger,
};
use storage::repository::{SubmissionId, SubmissionRepository};
use uuid::Uuid;

use crate::error::SubmitError;

/// Identity recorded on a submission: the user id, or a fresh
/// `anonymous-{uuid}` tag for anonymous attempts.
#[must_use]
pub fn submitter_for(scope: &SessionScope) -> String {
    match scope {
        SessionScope::User(user) => user.to_string(),
        SessionScope::Anonymous => format!("anonymous-{}", Uuid::new_v4()),
    }
}

/// Assembles the final record and hands it to the submission collaborator.
#[derive(Clone)]
pub struct SubmissionWorkflow {
    sink: Arc<dyn SubmissionRepository>,
    clock: Clock,
}

impl SubmissionWorkflow {
    #[must_use]
    pub fn new(sink: Arc<dyn SubmissionRepository>, clock: Clock) -> Self {
        Self { sink, clock }
    }

    #[must_use]
    pub fn assemble(
        &self,
        exam: &Exam,
        scope: &SessionScope,
        answers: BTreeMap<QuestionIndex, AnswerValue>,
        remaining_secs: u32,
        trigger: SubmitTrigger,
    ) -> Submission {
        Submission::assemble(
            exam.id().clone(),
            submitter_for(scope),
            answers,
            exam.category(),
            exam.duration_secs(),
            remaining_secs,
            exam.total_questions(),
            trigger,
            self.clock.now(),
        )
    }

    /// Send the record. No retry happens here.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Collaborator` with the collaborator's error.
    pub async fn deliver(&self, submission: &Submission) -> Result<SubmissionId, SubmitError> {
        let id = self
            .sink
            .create_submission(submission)
            .await
            .map_err(SubmitError::Collaborator)?;
        tracing::info!(
            exam = %submission.exam_id(),
            submission = %id,
            trigger = %submission.trigger(),
            completion = submission.completion_percent(),
            "submission recorded"
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::UserId;

    #[test]
    fn anonymous_submitters_are_tagged_and_unique() {
        let first = submitter_for(&SessionScope::Anonymous);
        let second = submitter_for(&SessionScope::Anonymous);
        assert!(first.starts_with("anonymous-"));
        assert_ne!(first, second);
        assert_eq!(submitter_for(&SessionScope::User(UserId::new("u1"))), "u1");
    }
}
