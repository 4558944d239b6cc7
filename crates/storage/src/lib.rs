#![forbid(unsafe_code)]

pub mod record;
pub mod repository;
pub mod sqlite;

pub use record::ExamRecord;
pub use repository::{
    ExamSource, InMemoryRepository, ProgressKey, ProgressRepository, Storage, StorageError,
    SubmissionId, SubmissionRepository,
};
