use std::collections::{BTreeMap, BTreeSet};

use exam_core::model::{
    AnswerError, AnswerPatch, AnswerShape, AnswerValue, Exam, ExamCategory, PatchOutcome,
    Question, QuestionIndex, word_count,
};
use exam_core::registry::QuestionKind;

use crate::error::SessionError;

/// Word count of a writing answer against the task's minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritingProgress {
    pub words: usize,
    pub minimum: Option<usize>,
}

impl WritingProgress {
    /// Advisory only; a short essay can still be submitted.
    #[must_use]
    pub fn meets_minimum(&self) -> bool {
        self.minimum.is_none_or(|min| self.words >= min)
    }
}

/// Every answer of one session, keyed by exam-wide question index.
///
/// Writes are interpreted against the shape the registry assigns to the
/// question's type, so a stored value never changes variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerStore {
    answers: BTreeMap<QuestionIndex, AnswerValue>,
}

fn shape_of(question: &Question) -> Result<AnswerShape, SessionError> {
    QuestionKind::from_tag(question.type_tag())
        .map(QuestionKind::shape)
        .ok_or_else(|| SessionError::UnsupportedQuestionType {
            index: question.index(),
            tag: question.type_tag().to_string(),
        })
}

impl AnswerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted answer set, rejecting answers that do not
    /// belong to `exam` or whose variant disagrees with the question type.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::MalformedProgress` on the first bad entry.
    pub fn from_snapshot(
        exam: &Exam,
        answers: BTreeMap<QuestionIndex, AnswerValue>,
    ) -> Result<Self, SessionError> {
        for (index, value) in &answers {
            let question = exam.question(*index).ok_or_else(|| {
                SessionError::MalformedProgress(format!("answer for unknown question {index}"))
            })?;
            let expected = shape_of(question).map_err(|e| {
                SessionError::MalformedProgress(e.to_string())
            })?;
            if value.shape() != expected {
                return Err(SessionError::MalformedProgress(format!(
                    "question {index} expects {expected}, snapshot holds {}",
                    value.shape()
                )));
            }
        }
        Ok(Self { answers })
    }

    #[must_use]
    pub fn get(&self, index: QuestionIndex) -> Option<&AnswerValue> {
        self.answers.get(&index)
    }

    /// Apply one edit to `question`'s answer.
    ///
    /// A refused selection (`PatchOutcome::CapReached`) leaves the store as it was.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnsupportedQuestionType` for questions the
    /// registry does not know, or `SessionError::Answer` when the patch
    /// targets a different shape than the question's.
    pub fn set(
        &mut self,
        question: &Question,
        patch: AnswerPatch,
    ) -> Result<PatchOutcome, SessionError> {
        let shape = shape_of(question)?;
        if patch.shape() != shape {
            return Err(AnswerError::ShapeMismatch {
                expected: shape,
                found: patch.shape(),
            }
            .into());
        }

        let cap = question.max_selections();
        if let Some(current) = self.answers.get_mut(&question.index()) {
            return Ok(current.apply(patch, cap)?);
        }

        let mut value = AnswerValue::empty(shape);
        let outcome = value.apply(patch, cap)?;
        if outcome == PatchOutcome::Applied {
            self.answers.insert(question.index(), value);
        }
        Ok(outcome)
    }

    /// Indices whose answer is not blank.
    #[must_use]
    pub fn answered_indices(&self) -> BTreeSet<QuestionIndex> {
        self.answers
            .iter()
            .filter(|(_, value)| !value.is_blank())
            .map(|(index, _)| *index)
            .collect()
    }

    #[must_use]
    pub fn is_answered(&self, index: QuestionIndex) -> bool {
        self.answers.get(&index).is_some_and(|value| !value.is_blank())
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionIndex, AnswerValue> {
        &self.answers
    }

    /// Word count for writing questions, `None` for every other kind.
    #[must_use]
    pub fn writing_progress(&self, question: &Question) -> Option<WritingProgress> {
        let kind = QuestionKind::from_tag(question.type_tag())?;
        if kind.category() != ExamCategory::Writing {
            return None;
        }
        let words = self
            .get(question.index())
            .and_then(AnswerValue::as_scalar)
            .map_or(0, word_count);
        Some(WritingProgress {
            words,
            minimum: question.min_words().or(kind.default_min_words()),
        })
    }
}
