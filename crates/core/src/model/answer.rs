use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Errors raised when an answer edit cannot be applied.
///
/// A question keeps the variant it was first answered with for the whole
/// session, so a shape mismatch indicates a caller bug. An out-of-range blank
/// comes from user input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("answer shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        expected: AnswerShape,
        found: AnswerShape,
    },

    #[error("blank position {position} is out of range (limit {limit})")]
    PositionOutOfRange { position: usize, limit: usize },
}

/// Upper bound on blanks in one ordered-list answer.
pub const MAX_BLANKS: usize = 256;

//
// ─── SHAPE ─────────────────────────────────────────────────────────────────────
//

/// The four natural answer shapes a question type can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerShape {
    /// One free-text or single-choice value.
    Scalar,
    /// Positional blanks, in order of appearance within the question.
    OrderedList,
    /// Sub-answers addressed by an opaque string key.
    KeyedMap,
    /// Several simultaneous selections, order irrelevant.
    SelectionSet,
}

impl AnswerShape {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerShape::Scalar => "scalar",
            AnswerShape::OrderedList => "ordered_list",
            AnswerShape::KeyedMap => "keyed_map",
            AnswerShape::SelectionSet => "selection_set",
        }
    }
}

impl fmt::Display for AnswerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── VALUE ─────────────────────────────────────────────────────────────────────
//

/// Canonical representation of a test-taker's response to one question.
///
/// Sorted containers keep the serialized form deterministic, so a snapshot
/// written twice without changes is byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Scalar(String),
    /// Unset positions hold an empty string, never a hole.
    OrderedList(Vec<String>),
    /// Keys are not validated: statement indices, `"row-col"` cells and map
    /// labels all pass through untouched.
    KeyedMap(BTreeMap<String, String>),
    SelectionSet(BTreeSet<String>),
}

/// A single user edit, interpreted against the question's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerPatch {
    /// Replace a scalar answer wholesale.
    Replace(String),
    /// Overwrite one blank, padding earlier blanks with empty strings.
    Blank { position: usize, value: String },
    /// Shallow-merge one keyed sub-answer.
    Entry { key: String, value: String },
    /// Add or remove one selection.
    Select { value: String, included: bool },
}

impl AnswerPatch {
    /// The answer shape this patch can be applied to.
    #[must_use]
    pub fn shape(&self) -> AnswerShape {
        match self {
            AnswerPatch::Replace(_) => AnswerShape::Scalar,
            AnswerPatch::Blank { .. } => AnswerShape::OrderedList,
            AnswerPatch::Entry { .. } => AnswerShape::KeyedMap,
            AnswerPatch::Select { .. } => AnswerShape::SelectionSet,
        }
    }
}

/// What happened when a patch was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// A selection was refused because the question's cap is already reached.
    /// The answer is untouched.
    CapReached,
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::Applied => f.write_str("answer saved"),
            PatchOutcome::CapReached => f.write_str("selection limit reached, answer unchanged"),
        }
    }
}

impl AnswerValue {
    /// An empty answer of the given shape.
    #[must_use]
    pub fn empty(shape: AnswerShape) -> Self {
        match shape {
            AnswerShape::Scalar => AnswerValue::Scalar(String::new()),
            AnswerShape::OrderedList => AnswerValue::OrderedList(Vec::new()),
            AnswerShape::KeyedMap => AnswerValue::KeyedMap(BTreeMap::new()),
            AnswerShape::SelectionSet => AnswerValue::SelectionSet(BTreeSet::new()),
        }
    }

    #[must_use]
    pub fn shape(&self) -> AnswerShape {
        match self {
            AnswerValue::Scalar(_) => AnswerShape::Scalar,
            AnswerValue::OrderedList(_) => AnswerShape::OrderedList,
            AnswerValue::KeyedMap(_) => AnswerShape::KeyedMap,
            AnswerValue::SelectionSet(_) => AnswerShape::SelectionSet,
        }
    }

    /// True when nothing meaningful has been entered yet.
    ///
    /// Whitespace-only text counts as blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Scalar(text) => text.trim().is_empty(),
            AnswerValue::OrderedList(blanks) => blanks.iter().all(|b| b.trim().is_empty()),
            AnswerValue::KeyedMap(entries) => entries.values().all(|v| v.trim().is_empty()),
            AnswerValue::SelectionSet(selected) => selected.is_empty(),
        }
    }

    /// Apply one edit in place.
    ///
    /// `max_selections` only matters for selection sets; `None` means uncapped.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::ShapeMismatch` if the patch targets a different
    /// shape than this value, or `AnswerError::PositionOutOfRange` for a blank
    /// at or beyond [`MAX_BLANKS`].
    pub fn apply(
        &mut self,
        patch: AnswerPatch,
        max_selections: Option<usize>,
    ) -> Result<PatchOutcome, AnswerError> {
        match (self, patch) {
            (AnswerValue::Scalar(current), AnswerPatch::Replace(value)) => {
                *current = value;
                Ok(PatchOutcome::Applied)
            }
            (AnswerValue::OrderedList(blanks), AnswerPatch::Blank { position, value }) => {
                let len = position
                    .checked_add(1)
                    .filter(|len| *len <= MAX_BLANKS)
                    .ok_or(AnswerError::PositionOutOfRange {
                        position,
                        limit: MAX_BLANKS,
                    })?;
                if blanks.len() < len {
                    blanks.resize(len, String::new());
                }
                blanks[position] = value;
                Ok(PatchOutcome::Applied)
            }
            (AnswerValue::KeyedMap(entries), AnswerPatch::Entry { key, value }) => {
                entries.insert(key, value);
                Ok(PatchOutcome::Applied)
            }
            (AnswerValue::SelectionSet(selected), AnswerPatch::Select { value, included }) => {
                if !included {
                    selected.remove(&value);
                    return Ok(PatchOutcome::Applied);
                }
                if selected.contains(&value) {
                    return Ok(PatchOutcome::Applied);
                }
                if max_selections.is_some_and(|cap| selected.len() >= cap) {
                    return Ok(PatchOutcome::CapReached);
                }
                selected.insert(value);
                Ok(PatchOutcome::Applied)
            }
            (current, patch) => Err(AnswerError::ShapeMismatch {
                expected: current.shape(),
                found: patch.shape(),
            }),
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            AnswerValue::Scalar(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blanks(&self) -> Option<&[String]> {
        match self {
            AnswerValue::OrderedList(blanks) => Some(blanks),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_entries(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            AnswerValue::KeyedMap(entries) => Some(entries),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_selection(&self) -> Option<&BTreeSet<String>> {
        match self {
            AnswerValue::SelectionSet(selected) => Some(selected),
            _ => None,
        }
    }
}

/// Number of whitespace-separated words in `text`.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
