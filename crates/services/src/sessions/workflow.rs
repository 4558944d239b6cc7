use std::sync::Arc;

use exam_core::Clock;
use exam_core::model::{ExamId, SessionScope};
use storage::repository::{
    ExamSource, ProgressKey, ProgressRepository, Storage, SubmissionRepository,
};

use super::persistence::ProgressAdapter;
use super::service::ExamSession;
use super::submission::SubmissionWorkflow;
use crate::error::SessionError;

/// Orchestrates session start and resume against the collaborators.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    exams: Arc<dyn ExamSource>,
    progress: Arc<dyn ProgressRepository>,
    submissions: Arc<dyn SubmissionRepository>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        exams: Arc<dyn ExamSource>,
        progress: Arc<dyn ProgressRepository>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self {
            clock,
            exams,
            progress,
            submissions,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.exams),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.submissions),
        )
    }

    /// Load the exam and any saved progress for `scope`, then start the
    /// countdown from the time the attempt has left.
    ///
    /// Nothing is saved here; the first snapshot is written by the first
    /// answer or navigation event. A resumed attempt with no time left comes
    /// back in `TimerState::Expiring` and must be auto-submitted.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ExamLoad` or `SessionError::ProgressLoad` when a
    /// collaborator fails, or `SessionError::MalformedProgress` when the saved
    /// snapshot does not fit the exam. No session is created in those cases.
    pub async fn start_session(
        &self,
        exam_id: &ExamId,
        scope: SessionScope,
    ) -> Result<ExamSession, SessionError> {
        let exam = self
            .exams
            .fetch_exam(exam_id)
            .await
            .map_err(SessionError::ExamLoad)?;

        let persistence = ProgressAdapter::new(
            Arc::clone(&self.progress),
            ProgressKey::new(exam.id().clone(), scope.clone()),
        );
        let snapshot = persistence.load().await?;
        let resumed = snapshot.is_some();

        let workflow = SubmissionWorkflow::new(Arc::clone(&self.submissions), self.clock);
        let mut session =
            ExamSession::new(exam, scope, snapshot, persistence, workflow, self.clock)?;
        session.start()?;

        tracing::info!(
            exam = %exam_id,
            resumed,
            remaining = session.remaining_secs(),
            answered = session.answers().answered_indices().len(),
            "session started"
        );
        Ok(session)
    }
}
