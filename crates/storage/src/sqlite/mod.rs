use std::sync::Arc;
use std::time::Duration;

use exam_core::model::ExamId;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::record::ExamRecord;
use crate::repository::{
    ExamSource, ProgressRepository, Storage, StorageError, SubmissionRepository,
};

mod exam_repo;
mod mapping;
mod migrate;
mod progress_repo;
mod submission_repo;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// a connection pragma fails during setup.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }

    /// Validate an authored record and store it, replacing any exam with the
    /// same id. Returns the id the exam was stored under.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the record does not translate
    /// into a valid exam, or `StorageError::Connection` on database failure.
    pub async fn import_exam(
        &self,
        record: &ExamRecord,
        fallback_id: &ExamId,
    ) -> Result<ExamId, StorageError> {
        let exam = record.clone().into_exam(fallback_id)?;
        exam_repo::upsert_record(&self.pool, exam.id(), record).await?;
        tracing::info!(
            exam = %exam.id(),
            questions = exam.total_questions(),
            "imported exam"
        );
        Ok(exam.id().clone())
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let exams: Arc<dyn ExamSource> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let submissions: Arc<dyn SubmissionRepository> = Arc::new(repo);
        Ok(Self {
            exams,
            progress,
            submissions,
        })
    }
}
