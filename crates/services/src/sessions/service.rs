use chrono::{DateTime, Utc};

use exam_core::Clock;
use exam_core::model::{
    AnswerPatch, AnswerValue, Exam, PatchOutcome, QuestionIndex, SessionProgress, SessionScope,
    SubmitTrigger,
};
use exam_core::registry::{QuestionView, dispatch};
use exam_core::timer::{Countdown, Tick, TimerState, TimerUpdate};
use storage::repository::SubmissionId;

use super::answers::{AnswerStore, WritingProgress};
use super::navigation::{NavigationTracker, QuestionStatus};
use super::persistence::ProgressAdapter;
use super::submission::SubmissionWorkflow;
use crate::error::{SessionError, SubmitError};

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Aggregated view of a running session, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub current: QuestionIndex,
    pub part: Option<u32>,
    pub answered: usize,
    pub total: u32,
    pub review_marked: Vec<QuestionIndex>,
    pub timer: TimerUpdate,
    pub state: TimerState,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One test-taker's attempt at one exam.
///
/// Owns the answer store, navigation tracker and countdown. Every accepted
/// mutation queues one snapshot save without waiting for it; submission goes through the countdown's
/// one-shot claim so at most one submission leaves the session.
pub struct ExamSession {
    exam: Exam,
    scope: SessionScope,
    answers: AnswerStore,
    navigation: NavigationTracker,
    countdown: Countdown,
    // elapsed time carried in from a snapshot until the countdown starts
    resumed_elapsed_secs: u32,
    last_saved_at: Option<DateTime<Utc>>,
    persistence: ProgressAdapter,
    submissions: SubmissionWorkflow,
    clock: Clock,
    submission_id: Option<SubmissionId>,
}

impl ExamSession {
    /// Build a session, seeding it from `snapshot` when resuming.
    ///
    /// The countdown is left `Uninitialized`; call [`ExamSession::start`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::MalformedProgress` if the snapshot does not fit
    /// the exam.
    pub fn new(
        exam: Exam,
        scope: SessionScope,
        snapshot: Option<SessionProgress>,
        persistence: ProgressAdapter,
        submissions: SubmissionWorkflow,
        clock: Clock,
    ) -> Result<Self, SessionError> {
        let total = exam.total_questions();
        let (answers, navigation, elapsed, last_saved_at) = match snapshot {
            Some(progress) => (
                AnswerStore::from_snapshot(&exam, progress.answers)?,
                NavigationTracker::restore(total, progress.current_index, progress.review_marked)?,
                progress.elapsed_secs,
                progress.last_saved_at,
            ),
            None => (AnswerStore::new(), NavigationTracker::new(total), 0, None),
        };

        Ok(Self {
            exam,
            scope,
            answers,
            navigation,
            countdown: Countdown::new(),
            resumed_elapsed_secs: elapsed,
            last_saved_at,
            persistence,
            submissions,
            clock,
            submission_id: None,
        })
    }

    /// Arm the countdown with whatever time the attempt has left.
    ///
    /// Returns `Tick::Expired` when a resumed attempt is already out of time;
    /// the caller must then run [`ExamSession::auto_submit`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Timer` if the countdown was already started.
    pub fn start(&mut self) -> Result<Tick, SessionError> {
        Ok(self
            .countdown
            .start(self.exam.duration_secs(), self.resumed_elapsed_secs)?)
    }

    // ─── Queries ───────────────────────────────────────────────────────────────

    #[must_use]
    pub fn exam(&self) -> &Exam {
        &self.exam
    }

    #[must_use]
    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    #[must_use]
    pub fn answer(&self, index: QuestionIndex) -> Option<&AnswerValue> {
        self.answers.get(index)
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerStore {
        &self.answers
    }

    #[must_use]
    pub fn current_index(&self) -> QuestionIndex {
        self.navigation.current()
    }

    #[must_use]
    pub fn current_part(&self) -> Option<u32> {
        self.navigation.current_part(&self.exam)
    }

    /// How the current question should be shown.
    #[must_use]
    pub fn current_view(&self) -> Option<QuestionView<'_>> {
        let view = self.exam.question(self.navigation.current()).map(dispatch)?;
        if let QuestionView::Fallback(diagnostic) = &view {
            tracing::warn!(
                exam = %self.exam.id(),
                question = %self.navigation.current(),
                tag = %diagnostic.detected_tag,
                "unsupported question type, showing raw content"
            );
        }
        Some(view)
    }

    #[must_use]
    pub fn question_status(&self, index: QuestionIndex) -> QuestionStatus {
        self.navigation
            .status(index, self.answers.is_answered(index))
    }

    #[must_use]
    pub fn writing_progress(&self, index: QuestionIndex) -> Option<WritingProgress> {
        self.exam
            .question(index)
            .and_then(|q| self.answers.writing_progress(q))
    }

    #[must_use]
    pub fn timer_state(&self) -> TimerState {
        self.countdown.state()
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.countdown.remaining_secs()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.countdown.is_finished()
    }

    #[must_use]
    pub fn submission_id(&self) -> Option<&SubmissionId> {
        self.submission_id.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            current: self.navigation.current(),
            part: self.current_part(),
            answered: self.answers.answered_indices().len(),
            total: self.exam.total_questions(),
            review_marked: self.navigation.review_marked().iter().copied().collect(),
            timer: TimerUpdate::new(self.countdown.remaining_secs()),
            state: self.countdown.state(),
        }
    }

    /// The snapshot as it would be persisted right now.
    #[must_use]
    pub fn snapshot(&self) -> SessionProgress {
        let elapsed_secs = if self.countdown.state() == TimerState::Uninitialized {
            self.resumed_elapsed_secs
        } else {
            self.countdown.elapsed_secs()
        };
        SessionProgress {
            current_index: self.navigation.current(),
            answers: self.answers.answers().clone(),
            review_marked: self.navigation.review_marked().clone(),
            elapsed_secs,
            last_saved_at: self.last_saved_at,
        }
    }

    // ─── Mutations ─────────────────────────────────────────────────────────────

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.countdown.state() {
            TimerState::Expiring | TimerState::AutoSubmitted | TimerState::ManuallySubmitted => {
                Err(SessionError::Finished)
            }
            _ => Ok(()),
        }
    }

    fn autosave(&mut self) {
        self.last_saved_at = Some(self.clock.now());
        self.persistence.autosave(self.snapshot());
    }

    /// Save the snapshot as is, without touching `last_saved_at`, and wait
    /// for it to land. Returns whether the save succeeded.
    pub async fn checkpoint(&self) -> bool {
        self.persistence.autosave(self.snapshot());
        self.persistence.flush().await
    }

    /// Wait for queued autosaves to land. Returns whether the last one
    /// succeeded.
    pub async fn wait_for_saves(&self) -> bool {
        self.persistence.flush().await
    }

    /// Apply an answer edit. An applied edit queues one autosave; a refused
    /// selection changes nothing and does not save.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for unknown questions, unsupported question
    /// types, mismatched patches, or a finished session.
    pub fn set_answer(
        &mut self,
        index: QuestionIndex,
        patch: AnswerPatch,
    ) -> Result<PatchOutcome, SessionError> {
        self.ensure_open()?;
        let question = self
            .exam
            .question(index)
            .ok_or(SessionError::UnknownQuestion(index))?;
        let outcome = self.answers.set(question, patch)?;
        if outcome == PatchOutcome::Applied {
            self.autosave();
        }
        Ok(outcome)
    }

    /// Jump to `index`. Returns `false` for an index outside the exam.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finished` after submission.
    pub fn go_to(&mut self, index: QuestionIndex) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let moved = self.navigation.go_to(index);
        self.after_navigation(moved)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Finished` after submission.
    pub fn next(&mut self) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let moved = self.navigation.next();
        self.after_navigation(moved)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Finished` after submission.
    pub fn previous(&mut self) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let moved = self.navigation.previous();
        self.after_navigation(moved)
    }

    fn after_navigation(&mut self, moved: bool) -> Result<bool, SessionError> {
        if moved {
            tracing::debug!(current = %self.navigation.current(), "navigated");
            self.autosave();
        }
        Ok(moved)
    }

    /// Flip the review mark on `index`; returns the new membership.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for an unknown index or a finished session.
    pub fn toggle_review(&mut self, index: QuestionIndex) -> Result<bool, SessionError> {
        self.ensure_open()?;
        let marked = self.navigation.toggle_review(index)?;
        self.autosave();
        Ok(marked)
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> Tick {
        let tick = self.countdown.tick();
        tracing::debug!(remaining = self.countdown.remaining_secs(), "tick");
        tick
    }

    // ─── Submission ────────────────────────────────────────────────────────────

    /// Submit at the test-taker's request.
    ///
    /// On failure the session stays open with its answers and the countdown
    /// resumes; the caller may retry.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::NotConfirmed` without confirmation,
    /// `SubmitError::Rejected` when the session is already submitting or
    /// submitted, or `SubmitError::Collaborator` when the collaborator fails.
    pub async fn submit(&mut self, confirmed: bool) -> Result<SubmissionId, SubmitError> {
        if !confirmed {
            return Err(SubmitError::NotConfirmed);
        }
        self.countdown.claim(SubmitTrigger::Manual)?;

        let result = self.deliver(SubmitTrigger::Manual).await;
        self.countdown.settle_manual(result.is_ok());
        if let Err(err) = &result {
            tracing::warn!(exam = %self.exam.id(), error = %err, "manual submission failed");
        }
        result
    }

    /// Forced submission after the countdown reached zero. Needs no
    /// confirmation and is never retried from here.
    ///
    /// When the collaborator fails, the snapshot is saved with the full
    /// duration elapsed, so the next start of this attempt expires at once
    /// and submits again.
    ///
    /// # Errors
    ///
    /// Returns `SubmitError::Rejected` unless the countdown is `Expiring`, or
    /// `SubmitError::Collaborator` when the collaborator fails.
    pub async fn auto_submit(&mut self) -> Result<SubmissionId, SubmitError> {
        self.countdown.claim(SubmitTrigger::Expiry)?;

        let result = self.deliver(SubmitTrigger::Expiry).await;
        if let Err(err) = &result {
            tracing::error!(exam = %self.exam.id(), error = %err, "submission at expiry failed");
            self.checkpoint().await;
        }
        result
    }

    async fn deliver(&mut self, trigger: SubmitTrigger) -> Result<SubmissionId, SubmitError> {
        let submission = self.submissions.assemble(
            &self.exam,
            &self.scope,
            self.answers.answers().clone(),
            self.countdown.remaining_secs(),
            trigger,
        );
        let id = self.submissions.deliver(&submission).await?;

        if let Err(err) = self.persistence.clear().await {
            tracing::warn!(error = %err, "submitted but failed to clear saved progress");
        }
        self.submission_id = Some(id.clone());
        Ok(id)
    }
}
