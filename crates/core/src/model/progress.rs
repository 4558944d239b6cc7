use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::model::answer::AnswerValue;
use crate::model::ids::QuestionIndex;

/// Durable snapshot of one in-progress exam attempt.
///
/// This is the only shape handed to progress storage; it is rebuilt from the
/// live session on every autosave and fed back in on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub current_index: QuestionIndex,
    #[serde(default)]
    pub answers: BTreeMap<QuestionIndex, AnswerValue>,
    #[serde(default)]
    pub review_marked: BTreeSet<QuestionIndex>,
    #[serde(default)]
    pub elapsed_secs: u32,
    #[serde(default)]
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl SessionProgress {
    /// Progress for an attempt that has not been touched yet.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            current_index: QuestionIndex::new(1),
            answers: BTreeMap::new(),
            review_marked: BTreeSet::new(),
            elapsed_secs: 0,
            last_saved_at: None,
        }
    }
}
