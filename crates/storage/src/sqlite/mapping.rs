use exam_core::model::{SessionProgress, Submission, SubmitTrigger};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::record::ExamRecord;
use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

fn from_json<T: DeserializeOwned>(field: &'static str, text: &str) -> Result<T, StorageError> {
    serde_json::from_str(text).map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}

pub(crate) fn trigger_to_str(trigger: SubmitTrigger) -> &'static str {
    match trigger {
        SubmitTrigger::Manual => "manual",
        SubmitTrigger::Expiry => "expiry",
    }
}

pub(crate) fn parse_trigger(s: &str) -> Result<SubmitTrigger, StorageError> {
    match s {
        "manual" => Ok(SubmitTrigger::Manual),
        "expiry" => Ok(SubmitTrigger::Expiry),
        _ => Err(StorageError::Serialization(format!("invalid trigger: {s}"))),
    }
}

pub(crate) fn map_exam_record_row(row: &SqliteRow) -> Result<ExamRecord, StorageError> {
    let text: String = row.try_get("record").map_err(ser)?;
    from_json("record", &text)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<SessionProgress, StorageError> {
    let text: String = row.try_get("snapshot").map_err(ser)?;
    from_json("snapshot", &text)
}

/// The JSON body is authoritative; the indexed columns must agree with it.
pub(crate) fn map_submission_row(row: &SqliteRow) -> Result<Submission, StorageError> {
    let text: String = row.try_get("body").map_err(ser)?;
    let submission: Submission = from_json("body", &text)?;

    let trigger = parse_trigger(&row.try_get::<String, _>("trigger").map_err(ser)?)?;
    if trigger != submission.trigger() {
        return Err(StorageError::Serialization(format!(
            "trigger column {trigger} disagrees with body {}",
            submission.trigger()
        )));
    }
    Ok(submission)
}
