use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::model::answer::AnswerValue;
use crate::model::exam::ExamCategory;
use crate::model::ids::{ExamId, QuestionIndex};

/// What caused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitTrigger {
    /// The test-taker pressed submit and confirmed.
    Manual,
    /// The countdown reached zero.
    Expiry,
}

impl fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitTrigger::Manual => f.write_str("manual"),
            SubmitTrigger::Expiry => f.write_str("expiry"),
        }
    }
}

/// Finalized, immutable record of one exam attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    exam_id: ExamId,
    submitter: String,
    answers: BTreeMap<QuestionIndex, AnswerValue>,
    category: ExamCategory,
    time_taken_secs: u32,
    completion_percent: f64,
    trigger: SubmitTrigger,
    submitted_at: DateTime<Utc>,
}

impl Submission {
    /// Assemble a submission from the final session state.
    ///
    /// Time taken is `duration - remaining`; completion counts only answers
    /// that are not blank.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn assemble(
        exam_id: ExamId,
        submitter: impl Into<String>,
        answers: BTreeMap<QuestionIndex, AnswerValue>,
        category: ExamCategory,
        duration_secs: u32,
        remaining_secs: u32,
        total_questions: u32,
        trigger: SubmitTrigger,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        let answered = answers.values().filter(|a| !a.is_blank()).count();
        let completion_percent = completion_percent(answered, total_questions);

        Self {
            exam_id,
            submitter: submitter.into(),
            answers,
            category,
            time_taken_secs: duration_secs.saturating_sub(remaining_secs),
            completion_percent,
            trigger,
            submitted_at,
        }
    }

    #[must_use]
    pub fn exam_id(&self) -> &ExamId {
        &self.exam_id
    }

    /// User id for identified sessions, `anonymous-…` otherwise.
    #[must_use]
    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionIndex, AnswerValue> {
        &self.answers
    }

    #[must_use]
    pub fn category(&self) -> ExamCategory {
        self.category
    }

    #[must_use]
    pub fn time_taken_secs(&self) -> u32 {
        self.time_taken_secs
    }

    #[must_use]
    pub fn completion_percent(&self) -> f64 {
        self.completion_percent
    }

    #[must_use]
    pub fn trigger(&self) -> SubmitTrigger {
        self.trigger
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

#[allow(clippy::cast_precision_loss)]
fn completion_percent(answered: usize, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = answered as f64 / f64::from(total) * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn metrics_are_derived_from_state() {
        let mut answers = BTreeMap::new();
        answers.insert(QuestionIndex::new(1), AnswerValue::Scalar("B".into()));
        answers.insert(QuestionIndex::new(2), AnswerValue::OrderedList(vec![String::new()]));
        answers.insert(
            QuestionIndex::new(3),
            AnswerValue::OrderedList(vec![String::new(), "x".into()]),
        );

        let submission = Submission::assemble(
            ExamId::new("e1"),
            "u1",
            answers,
            ExamCategory::Reading,
            3600,
            600,
            3,
            SubmitTrigger::Manual,
            fixed_now(),
        );

        assert_eq!(submission.time_taken_secs(), 3000);
        assert!((submission.completion_percent() - 66.67).abs() < f64::EPSILON);
        assert_eq!(submission.answers().len(), 3);
        assert_eq!(submission.trigger(), SubmitTrigger::Manual);
    }

    #[test]
    fn empty_exam_has_zero_completion() {
        assert!(completion_percent(0, 0).abs() < f64::EPSILON);
        assert!((completion_percent(4, 4) - 100.0).abs() < f64::EPSILON);
    }
}
