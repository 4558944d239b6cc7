use chrono::Utc;
use exam_core::model::SessionProgress;

use super::SqliteRepository;
use super::mapping::{conn, map_progress_row, to_json};
use crate::repository::{ProgressKey, ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn save_progress(
        &self,
        key: &ProgressKey,
        progress: &SessionProgress,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO session_progress (storage_key, exam_id, user_id, snapshot, saved_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(storage_key) DO UPDATE SET
                snapshot = excluded.snapshot,
                saved_at = excluded.saved_at
            ",
        )
        .bind(key.storage_key())
        .bind(key.exam_id().as_str())
        .bind(key.scope().user().map(|u| u.as_str().to_string()))
        .bind(to_json(progress)?)
        .bind(progress.last_saved_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn load_progress(
        &self,
        key: &ProgressKey,
    ) -> Result<Option<SessionProgress>, StorageError> {
        let row = sqlx::query("SELECT snapshot FROM session_progress WHERE storage_key = ?1")
            .bind(key.storage_key())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn clear_progress(&self, key: &ProgressKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_progress WHERE storage_key = ?1")
            .bind(key.storage_key())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }
}
