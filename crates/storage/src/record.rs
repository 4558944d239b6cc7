//! Raw exam records as authored or served by a backend, and their translation
//! into the canonical `Exam`.
//!
//! Field aliases (`type`/`test_type`/`exam_type`, `duration`/`duration_seconds`)
//! are settled here so the rest of the system only sees one shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use exam_core::model::{Exam, ExamCategory, ExamId, Question, QuestionIndex, Section};

use crate::repository::StorageError;

/// Duration used when a record does not declare one.
pub const DEFAULT_DURATION_SECS: u32 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(
        default,
        rename = "type",
        alias = "test_type",
        alias = "exam_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<String>,
    #[serde(
        default,
        alias = "duration_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<u32>,
    #[serde(default, alias = "audioUrl", skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub sections: Vec<SectionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<QuestionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(rename = "type", alias = "question_type")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default = "empty_payload")]
    pub payload: Value,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ExamRecord {
    /// Parse a record from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the text is not a valid record.
    pub fn from_json(text: &str) -> Result<Self, StorageError> {
        serde_json::from_str(text).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Serialize back to JSON text.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if serialization fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// The record's own id, or `fallback` when it carries none.
    #[must_use]
    pub fn exam_id_or(&self, fallback: &ExamId) -> ExamId {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| fallback.clone(), ExamId::new)
    }

    /// Translate into the canonical exam.
    ///
    /// Sections without an index are numbered by position; questions without
    /// an index continue the exam-wide count from the previous question.
    /// A missing or unrecognised category falls back to listening.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` when the translated exam violates
    /// its invariants (for example non-contiguous question numbering).
    pub fn into_exam(self, fallback_id: &ExamId) -> Result<Exam, StorageError> {
        let id = self.exam_id_or(fallback_id);
        let category = resolve_category(&id, self.category.as_deref());
        let duration = self.duration.unwrap_or(DEFAULT_DURATION_SECS);

        let mut next_index = 1_u32;
        let mut sections = Vec::with_capacity(self.sections.len());
        for (position, section) in self.sections.into_iter().enumerate() {
            let section_index = section
                .index
                .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX));

            let mut questions = Vec::with_capacity(section.questions.len());
            for question in section.questions {
                let index = question.index.unwrap_or(next_index);
                next_index = index.saturating_add(1);
                questions.push(Question::new(
                    QuestionIndex::new(index),
                    question.type_tag,
                    question.instructions,
                    question.payload,
                ));
            }
            sections.push(Section::new(section_index, section.title, questions));
        }

        Exam::new(id, self.title, category, duration, self.audio_url, sections)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

fn resolve_category(id: &ExamId, raw: Option<&str>) -> ExamCategory {
    match raw.map(str::parse::<ExamCategory>) {
        Some(Ok(category)) => category,
        Some(Err(err)) => {
            tracing::warn!("exam {id}: {err}, treating as listening");
            ExamCategory::Listening
        }
        None => ExamCategory::Listening,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciles_backend_field_names() {
        let record = ExamRecord::from_json(
            r#"{
                "id": "reading-1",
                "title": "Reading Practice",
                "exam_type": "reading",
                "duration_seconds": 3600,
                "question_count": 2,
                "sections": [
                    {"index": 1, "title": "Passage 1", "questions": [
                        {"index": 2, "type": "matching_headings", "payload": {"options": ["i", "ii"]}},
                        {"index": 1, "type": "true-false-not-given", "instructions": "Choose"}
                    ]}
                ]
            }"#,
        )
        .unwrap();

        let exam = record.into_exam(&ExamId::new("ignored")).unwrap();
        assert_eq!(exam.id(), &ExamId::new("reading-1"));
        assert_eq!(exam.category(), ExamCategory::Reading);
        assert_eq!(exam.duration_secs(), 3600);
        let q1 = exam.question(QuestionIndex::new(1)).unwrap();
        assert_eq!(q1.type_tag(), "true-false-not-given");
        assert_eq!(q1.instructions(), Some("Choose"));
        assert_eq!(q1.payload(), &empty_payload());
    }

    #[test]
    fn fills_defaults_for_admin_style_records() {
        let record = ExamRecord::from_json(
            r#"{
                "title": "Listening",
                "test_type": "listening",
                "duration": 1800,
                "sections": [
                    {"title": "Part 2", "index": 2, "questions": [{"type": "matching"}]},
                    {"title": "Part 1", "index": 1, "questions": [{"type": "mcq_single"}, {"type": "fill_in_gaps"}]}
                ]
            }"#,
        )
        .unwrap();

        // authored order is Part 2 first, so running numbers follow authoring
        // order and the sorted exam ends up non-contiguous
        let err = record.clone().into_exam(&ExamId::new("l1")).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));

        let mut reordered = record;
        reordered.sections.reverse();
        let exam = reordered.into_exam(&ExamId::new("l1")).unwrap();
        assert_eq!(exam.id(), &ExamId::new("l1"));
        assert_eq!(exam.duration_secs(), 1800);
        assert_eq!(exam.total_questions(), 3);
        assert_eq!(exam.section_for(QuestionIndex::new(3)).unwrap().title(), "Part 2");
    }

    #[test]
    fn unknown_or_missing_category_falls_back_to_listening() {
        let record = ExamRecord::from_json(
            r#"{"title": "Mixed", "exam_type": "comprehensive",
                "sections": [{"questions": [{"type": "writing_task"}]}]}"#,
        )
        .unwrap();
        let exam = record.into_exam(&ExamId::new("m1")).unwrap();
        assert_eq!(exam.category(), ExamCategory::Listening);
        assert_eq!(exam.duration_secs(), DEFAULT_DURATION_SECS);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = ExamRecord::from_json("{\"sections\": 3}").unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
