use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{ExamId, QuestionIndex};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("exam duration must be > 0 seconds")]
    ZeroDuration,

    #[error("exam has no questions")]
    NoQuestions,

    #[error("section index {0} appears more than once")]
    DuplicateSection(u32),

    #[error("question indices must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousQuestions { expected: u32, found: u32 },

    #[error("unknown exam category: {0}")]
    UnknownCategory(String),
}

//
// ─── CATEGORY ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamCategory {
    Listening,
    Reading,
    Writing,
}

impl ExamCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExamCategory::Listening => "listening",
            ExamCategory::Reading => "reading",
            ExamCategory::Writing => "writing",
        }
    }
}

impl fmt::Display for ExamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamCategory {
    type Err = ExamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listening" => Ok(ExamCategory::Listening),
            "reading" => Ok(ExamCategory::Reading),
            "writing" => Ok(ExamCategory::Writing),
            other => Err(ExamError::UnknownCategory(other.to_string())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// One assessable unit. Immutable for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    index: QuestionIndex,
    #[serde(rename = "type")]
    type_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    payload: Value,
}

impl Question {
    #[must_use]
    pub fn new(
        index: QuestionIndex,
        type_tag: impl Into<String>,
        instructions: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            index,
            type_tag: type_tag.into(),
            instructions: instructions.filter(|text| !text.trim().is_empty()),
            payload,
        }
    }

    #[must_use]
    pub fn index(&self) -> QuestionIndex {
        self.index
    }

    /// The tag exactly as authored; see `registry::normalize_tag`.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Maximum number of simultaneous selections, if the payload declares one.
    ///
    /// Zero is treated as "no cap".
    #[must_use]
    pub fn max_selections(&self) -> Option<usize> {
        self.payload_count(&["max_selections", "maxSelections"])
    }

    /// Minimum word count declared for a writing task.
    #[must_use]
    pub fn min_words(&self) -> Option<usize> {
        self.payload_count(&["min_words", "minWords"])
    }

    fn payload_count(&self, keys: &[&str]) -> Option<usize> {
        keys.iter()
            .find_map(|key| self.payload.get(*key).and_then(Value::as_u64))
            .filter(|n| *n > 0)
            .and_then(|n| usize::try_from(n).ok())
    }
}

//
// ─── SECTION ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    index: u32,
    title: String,
    questions: Vec<Question>,
}

impl Section {
    /// Questions are kept in index order regardless of input order.
    #[must_use]
    pub fn new(index: u32, title: impl Into<String>, mut questions: Vec<Question>) -> Self {
        questions.sort_by_key(Question::index);
        Self {
            index,
            title: title.into(),
            questions,
        }
    }

    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
}

//
// ─── EXAM ──────────────────────────────────────────────────────────────────────
//

/// A complete timed assessment.
///
/// Construction guarantees that question indices run `1..=total` without gaps
/// across all sections in section order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exam {
    id: ExamId,
    title: String,
    category: ExamCategory,
    duration_secs: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_url: Option<String>,
    sections: Vec<Section>,
}

impl Exam {
    /// Build and validate an exam definition.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::ZeroDuration` for a zero duration, `ExamError::NoQuestions`
    /// for an empty exam, `ExamError::DuplicateSection` for repeated section
    /// indices and `ExamError::NonContiguousQuestions` when the flat question
    /// numbering has gaps or repeats.
    pub fn new(
        id: ExamId,
        title: impl Into<String>,
        category: ExamCategory,
        duration_secs: u32,
        audio_url: Option<String>,
        mut sections: Vec<Section>,
    ) -> Result<Self, ExamError> {
        if duration_secs == 0 {
            return Err(ExamError::ZeroDuration);
        }

        sections.sort_by_key(Section::index);
        for pair in sections.windows(2) {
            if pair[0].index == pair[1].index {
                return Err(ExamError::DuplicateSection(pair[0].index));
            }
        }

        let mut expected = 1_u32;
        for question in sections.iter().flat_map(|s| s.questions.iter()) {
            let found = question.index.value();
            if found != expected {
                return Err(ExamError::NonContiguousQuestions { expected, found });
            }
            expected += 1;
        }
        if expected == 1 {
            return Err(ExamError::NoQuestions);
        }

        Ok(Self {
            id,
            title: title.into(),
            category,
            duration_secs,
            audio_url: audio_url.filter(|url| !url.trim().is_empty()),
            sections,
        })
    }

    #[must_use]
    pub fn id(&self) -> &ExamId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn category(&self) -> ExamCategory {
        self.category
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    #[must_use]
    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }

    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Number of questions across all sections.
    #[must_use]
    pub fn total_questions(&self) -> u32 {
        let total: usize = self.sections.iter().map(|s| s.questions.len()).sum();
        u32::try_from(total).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn contains(&self, index: QuestionIndex) -> bool {
        (1..=self.total_questions()).contains(&index.value())
    }

    /// All questions in exam order.
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flat_map(|s| s.questions.iter())
    }

    #[must_use]
    pub fn question(&self, index: QuestionIndex) -> Option<&Question> {
        self.locate(index)
            .map(|(section, offset)| &section.questions[offset])
    }

    /// The section holding the given question.
    #[must_use]
    pub fn section_for(&self, index: QuestionIndex) -> Option<&Section> {
        self.locate(index).map(|(section, _)| section)
    }

    // Numbering is contiguous, so the flat position is `index - 1`.
    fn locate(&self, index: QuestionIndex) -> Option<(&Section, usize)> {
        let mut remaining = usize::try_from(index.value().checked_sub(1)?).ok()?;
        for section in &self.sections {
            if remaining < section.questions.len() {
                return Some((section, remaining));
            }
            remaining -= section.questions.len();
        }
        None
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
