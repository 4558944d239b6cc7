use async_trait::async_trait;
use exam_core::model::{Exam, ExamId, SessionProgress, SessionScope, Submission};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Storage identifier for a created submission.
pub type SubmissionId = String;

/// Where a session's progress lives.
///
/// Anonymous attempts are keyed by exam alone; identified attempts by user
/// and exam, so two users never share a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgressKey {
    exam_id: ExamId,
    scope: SessionScope,
}

impl ProgressKey {
    #[must_use]
    pub fn new(exam_id: ExamId, scope: SessionScope) -> Self {
        Self { exam_id, scope }
    }

    #[must_use]
    pub fn exam_id(&self) -> &ExamId {
        &self.exam_id
    }

    #[must_use]
    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    /// Flat key used by key/value style backends.
    ///
    /// `/` and `%` inside ids are percent-encoded, so distinct keys never
    /// share a storage key.
    #[must_use]
    pub fn storage_key(&self) -> String {
        let exam = escape_segment(self.exam_id.as_str());
        match &self.scope {
            SessionScope::Anonymous => format!("exam-progress-{exam}"),
            SessionScope::User(user) => {
                format!("user-progress/{}/{exam}", escape_segment(user.as_str()))
            }
        }
    }
}

fn escape_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            _ => out.push(c),
        }
    }
    out
}

/// Source of exam definitions.
#[async_trait]
pub trait ExamSource: Send + Sync {
    /// Fetch an exam already translated into its canonical shape.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, `StorageError::Serialization`
    /// if the stored record is malformed, or other storage errors.
    async fn fetch_exam(&self, id: &ExamId) -> Result<Exam, StorageError>;
}

/// Durable home for in-progress snapshots.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist or replace the snapshot for `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn save_progress(
        &self,
        key: &ProgressKey,
        progress: &SessionProgress,
    ) -> Result<(), StorageError>;

    /// Fetch the snapshot for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored snapshot is
    /// malformed, or other storage errors.
    async fn load_progress(&self, key: &ProgressKey)
    -> Result<Option<SessionProgress>, StorageError>;

    /// Remove the snapshot for `key`. Removing a missing snapshot succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be reached.
    async fn clear_progress(&self, key: &ProgressKey) -> Result<(), StorageError>;
}

/// Receiver of finalized submissions.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Durably record a submission and return its new id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the submission cannot be recorded.
    async fn create_submission(&self, submission: &Submission)
    -> Result<SubmissionId, StorageError>;

    /// Fetch a submission by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_submission(&self, id: &str) -> Result<Submission, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    exams: Arc<Mutex<HashMap<ExamId, Exam>>>,
    progress: Arc<Mutex<HashMap<String, SessionProgress>>>,
    submissions: Arc<Mutex<HashMap<SubmissionId, Submission>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exam definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_exam(&self, exam: Exam) -> Result<(), StorageError> {
        let mut guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(exam.id().clone(), exam);
        Ok(())
    }

    /// Number of submissions recorded so far.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn submission_count(&self) -> Result<usize, StorageError> {
        let guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.len())
    }
}

#[async_trait]
impl ExamSource for InMemoryRepository {
    async fn fetch_exam(&self, id: &ExamId) -> Result<Exam, StorageError> {
        let guard = self
            .exams
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(id).cloned().ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn save_progress(
        &self,
        key: &ProgressKey,
        progress: &SessionProgress,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.storage_key(), progress.clone());
        Ok(())
    }

    async fn load_progress(
        &self,
        key: &ProgressKey,
    ) -> Result<Option<SessionProgress>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&key.storage_key()).cloned())
    }

    async fn clear_progress(&self, key: &ProgressKey) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&key.storage_key());
        Ok(())
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryRepository {
    async fn create_submission(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionId, StorageError> {
        let mut guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = Uuid::new_v4().to_string();
        guard.insert(id.clone(), submission.clone());
        Ok(id)
    }

    async fn get_submission(&self, id: &str) -> Result<Submission, StorageError> {
        let guard = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(id).cloned().ok_or(StorageError::NotFound)
    }
}

/// Aggregates the collaborator contracts behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub exams: Arc<dyn ExamSource>,
    pub progress: Arc<dyn ProgressRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repo(InMemoryRepository::new())
    }

    /// Use one repository for every contract.
    #[must_use]
    pub fn from_repo<R>(repo: R) -> Self
    where
        R: ExamSource + ProgressRepository + SubmissionRepository + Clone + 'static,
    {
        let exams: Arc<dyn ExamSource> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let submissions: Arc<dyn SubmissionRepository> = Arc::new(repo);
        Self {
            exams,
            progress,
            submissions,
        }
    }
}
