use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Version 1: exams, in-progress snapshots and submissions.
const V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS exams (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            record TEXT NOT NULL,
            imported_at TEXT NOT NULL
        );
    ",
    // one row per storage key; anonymous rows have a NULL user_id
    r"
        CREATE TABLE IF NOT EXISTS session_progress (
            storage_key TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            user_id TEXT,
            snapshot TEXT NOT NULL,
            saved_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS submissions (
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            submitter TEXT NOT NULL,
            trigger TEXT NOT NULL CHECK (trigger IN ('manual', 'expiry')),
            time_taken_secs INTEGER NOT NULL CHECK (time_taken_secs >= 0),
            completion_percent REAL NOT NULL,
            body TEXT NOT NULL,
            submitted_at TEXT NOT NULL
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_submissions_exam_submitted
            ON submissions (exam_id, submitted_at);
    ",
];

/// Ordered list of schema versions and their statements.
const MIGRATIONS: &[(i64, &[&str])] = &[(1, V1)];

/// Applies every migration not yet recorded in `schema_migrations`, each in
/// its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
        ",
    )
    .execute(pool)
    .await?;

    for (version, statements) in MIGRATIONS {
        let applied = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(*version)
            .fetch_optional(pool)
            .await?
            .is_some();
        if applied {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in *statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2) \
             ON CONFLICT(version) DO NOTHING",
        )
        .bind(*version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}
