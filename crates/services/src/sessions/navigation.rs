use std::collections::BTreeSet;

use exam_core::model::{Exam, QuestionIndex};

use crate::error::SessionError;

/// Palette entry for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionStatus {
    pub is_current: bool,
    pub is_answered: bool,
    pub is_marked: bool,
}

/// Current-question pointer and review marks.
///
/// The pointer always stays within `1..=total`; requests outside that range
/// are ignored rather than clamped onto the nearest edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTracker {
    total: u32,
    current: QuestionIndex,
    review_marked: BTreeSet<QuestionIndex>,
}

impl NavigationTracker {
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            total,
            current: QuestionIndex::new(1),
            review_marked: BTreeSet::new(),
        }
    }

    /// Restore a persisted pointer and mark set.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::MalformedProgress` if any index is outside the exam.
    pub fn restore(
        total: u32,
        current: QuestionIndex,
        review_marked: BTreeSet<QuestionIndex>,
    ) -> Result<Self, SessionError> {
        let tracker = Self {
            total,
            current,
            review_marked,
        };
        if !tracker.in_range(current) {
            return Err(SessionError::MalformedProgress(format!(
                "current question {current} outside 1..={total}"
            )));
        }
        if let Some(stray) = tracker.review_marked.iter().find(|i| !tracker.in_range(**i)) {
            return Err(SessionError::MalformedProgress(format!(
                "review mark on unknown question {stray}"
            )));
        }
        Ok(tracker)
    }

    fn in_range(&self, index: QuestionIndex) -> bool {
        (1..=self.total).contains(&index.value())
    }

    #[must_use]
    pub fn current(&self) -> QuestionIndex {
        self.current
    }

    #[must_use]
    pub fn review_marked(&self) -> &BTreeSet<QuestionIndex> {
        &self.review_marked
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Move to `index`. Returns `false`, leaving the pointer alone, when the
    /// index is outside the exam.
    pub fn go_to(&mut self, index: QuestionIndex) -> bool {
        if !self.in_range(index) {
            return false;
        }
        self.current = index;
        true
    }

    /// No wraparound past the last question.
    pub fn next(&mut self) -> bool {
        let Some(target) = self.current.value().checked_add(1) else {
            return false;
        };
        self.go_to(QuestionIndex::new(target))
    }

    pub fn previous(&mut self) -> bool {
        let Some(target) = self.current.value().checked_sub(1) else {
            return false;
        };
        self.go_to(QuestionIndex::new(target))
    }

    /// Flip the review mark on `index` and return the new membership.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an index outside the exam.
    pub fn toggle_review(&mut self, index: QuestionIndex) -> Result<bool, SessionError> {
        if !self.in_range(index) {
            return Err(SessionError::UnknownQuestion(index));
        }
        if self.review_marked.remove(&index) {
            Ok(false)
        } else {
            self.review_marked.insert(index);
            Ok(true)
        }
    }

    /// 1-based section number holding the current question.
    #[must_use]
    pub fn current_part(&self, exam: &Exam) -> Option<u32> {
        exam.section_for(self.current).map(|s| s.index())
    }

    #[must_use]
    pub fn status(&self, index: QuestionIndex, is_answered: bool) -> QuestionStatus {
        QuestionStatus {
            is_current: index == self.current,
            is_answered,
            is_marked: self.review_marked.contains(&index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{ExamCategory, ExamId, Question, Section};

    fn q(n: u32) -> QuestionIndex {
        QuestionIndex::new(n)
    }

    #[test]
    fn out_of_range_targets_leave_pointer_unchanged() {
        let mut nav = NavigationTracker::new(3);
        assert!(nav.go_to(q(2)));
        assert!(!nav.go_to(q(0)));
        assert_eq!(nav.current(), q(2));
        assert!(!nav.go_to(q(4)));
        assert_eq!(nav.current(), q(2));
    }

    #[test]
    fn next_and_previous_stop_at_the_edges() {
        let mut nav = NavigationTracker::new(2);
        assert!(!nav.previous());
        assert_eq!(nav.current(), q(1));
        assert!(nav.next());
        assert!(!nav.next());
        assert_eq!(nav.current(), q(2));
        assert!(nav.previous());
        assert_eq!(nav.current(), q(1));
    }

    #[test]
    fn review_marks_toggle_independently_of_answers() {
        let mut nav = NavigationTracker::new(3);
        assert!(nav.toggle_review(q(3)).unwrap());
        assert_eq!(
            nav.status(q(3), false),
            QuestionStatus {
                is_current: false,
                is_answered: false,
                is_marked: true,
            }
        );
        assert!(!nav.toggle_review(q(3)).unwrap());
        assert!(nav.review_marked().is_empty());
        assert!(matches!(
            nav.toggle_review(q(4)),
            Err(SessionError::UnknownQuestion(_))
        ));
    }

    #[test]
    fn restore_rejects_indices_outside_exam() {
        assert!(NavigationTracker::restore(3, q(3), BTreeSet::from([q(1)])).is_ok());
        assert!(NavigationTracker::restore(3, q(0), BTreeSet::new()).is_err());
        assert!(NavigationTracker::restore(3, q(1), BTreeSet::from([q(7)])).is_err());
    }

    #[test]
    fn current_part_follows_section_boundaries() {
        let exam = Exam::new(
            ExamId::new("e1"),
            "Exam",
            ExamCategory::Listening,
            60,
            None,
            vec![
                Section::new(
                    1,
                    "Part 1",
                    vec![Question::new(q(1), "mcq_single", None, serde_json::json!({}))],
                ),
                Section::new(
                    2,
                    "Part 2",
                    vec![Question::new(q(2), "matching", None, serde_json::json!({}))],
                ),
            ],
        )
        .unwrap();

        let mut nav = NavigationTracker::new(exam.total_questions());
        assert_eq!(nav.current_part(&exam), Some(1));
        nav.next();
        assert_eq!(nav.current_part(&exam), Some(2));
    }
}
