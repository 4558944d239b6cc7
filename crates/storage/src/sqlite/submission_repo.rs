use exam_core::model::Submission;
use uuid::Uuid;

use super::SqliteRepository;
use super::mapping::{conn, map_submission_row, to_json, trigger_to_str};
use crate::repository::{StorageError, SubmissionId, SubmissionRepository};

#[async_trait::async_trait]
impl SubmissionRepository for SqliteRepository {
    async fn create_submission(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionId, StorageError> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r"
            INSERT INTO submissions (id, exam_id, submitter, trigger, time_taken_secs, completion_percent, body, submitted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id.as_str())
        .bind(submission.exam_id().as_str())
        .bind(submission.submitter())
        .bind(trigger_to_str(submission.trigger()))
        .bind(i64::from(submission.time_taken_secs()))
        .bind(submission.completion_percent())
        .bind(to_json(submission)?)
        .bind(submission.submitted_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(id)
    }

    async fn get_submission(&self, id: &str) -> Result<Submission, StorageError> {
        let row = sqlx::query("SELECT trigger, body FROM submissions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_submission_row(&row)
    }
}
