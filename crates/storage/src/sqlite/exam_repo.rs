use chrono::Utc;
use exam_core::model::{Exam, ExamId};
use sqlx::SqlitePool;

use super::SqliteRepository;
use super::mapping::{conn, map_exam_record_row, to_json};
use crate::record::ExamRecord;
use crate::repository::{ExamSource, StorageError};

pub(super) async fn upsert_record(
    pool: &SqlitePool,
    id: &ExamId,
    record: &ExamRecord,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO exams (id, title, record, imported_at)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            record = excluded.record,
            imported_at = excluded.imported_at
        ",
    )
    .bind(id.as_str())
    .bind(record.title.as_str())
    .bind(to_json(record)?)
    .bind(Utc::now())
    .execute(pool)
    .await
    .map_err(conn)?;
    Ok(())
}

#[async_trait::async_trait]
impl ExamSource for SqliteRepository {
    async fn fetch_exam(&self, id: &ExamId) -> Result<Exam, StorageError> {
        let row = sqlx::query("SELECT record FROM exams WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_exam_record_row(&row)?.into_exam(id)
    }
}
