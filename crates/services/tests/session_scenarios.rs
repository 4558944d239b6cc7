use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{
    AnswerPatch, AnswerValue, Exam, ExamCategory, ExamId, Question, QuestionIndex, Section,
    SessionProgress, SessionScope, Submission, SubmitTrigger, UserId,
};
use exam_core::time::fixed_clock;
use exam_core::timer::{Tick, TimerState};
use services::{
    ExamSession, SessionCommand, SessionError, SessionEvent, SessionLoopService,
    SessionRunner, SubmitError,
};
use storage::repository::{
    InMemoryRepository, ProgressKey, ProgressRepository, Storage, StorageError, SubmissionId,
    SubmissionRepository,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

fn q(n: u32) -> QuestionIndex {
    QuestionIndex::new(n)
}

fn three_question_exam(duration: u32) -> Exam {
    Exam::new(
        ExamId::new("e1"),
        "Scenario",
        ExamCategory::Reading,
        duration,
        None,
        vec![
            Section::new(
                1,
                "Passage 1",
                vec![
                    Question::new(q(1), "multiple_choice_single", None, serde_json::json!({})),
                    Question::new(q(2), "fill-in-gaps", None, serde_json::json!({"blanks": 2})),
                ],
            ),
            Section::new(
                2,
                "Passage 2",
                vec![Question::new(q(3), "Matching_Headings", None, serde_json::json!({}))],
            ),
        ],
    )
    .unwrap()
}

/// Submission sink that counts calls and can be switched to fail or stall.
#[derive(Default)]
struct CountingSink {
    calls: AtomicUsize,
    failing: AtomicBool,
    latency_secs: AtomicU64,
    inner: InMemoryRepository,
}

#[async_trait]
impl SubmissionRepository for CountingSink {
    async fn create_submission(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionId, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_secs.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_secs(latency)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("backend unavailable".into()));
        }
        self.inner.create_submission(submission).await
    }

    async fn get_submission(&self, id: &str) -> Result<Submission, StorageError> {
        self.inner.get_submission(id).await
    }
}

/// Progress store that refuses every save.
struct ReadOnlyProgress;

#[async_trait]
impl ProgressRepository for ReadOnlyProgress {
    async fn save_progress(
        &self,
        _key: &ProgressKey,
        _progress: &SessionProgress,
    ) -> Result<(), StorageError> {
        Err(StorageError::Connection("disk full".into()))
    }

    async fn load_progress(
        &self,
        _key: &ProgressKey,
    ) -> Result<Option<SessionProgress>, StorageError> {
        Ok(None)
    }

    async fn clear_progress(&self, _key: &ProgressKey) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Progress store that takes ten seconds per save.
#[derive(Default)]
struct SlowProgress {
    inner: InMemoryRepository,
    saves: AtomicUsize,
}

#[async_trait]
impl ProgressRepository for SlowProgress {
    async fn save_progress(
        &self,
        key: &ProgressKey,
        progress: &SessionProgress,
    ) -> Result<(), StorageError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save_progress(key, progress).await
    }

    async fn load_progress(
        &self,
        key: &ProgressKey,
    ) -> Result<Option<SessionProgress>, StorageError> {
        self.inner.load_progress(key).await
    }

    async fn clear_progress(&self, key: &ProgressKey) -> Result<(), StorageError> {
        self.inner.clear_progress(key).await
    }
}

struct Harness {
    repo: InMemoryRepository,
    sink: Arc<CountingSink>,
    service: SessionLoopService,
}

fn harness(duration: u32) -> Harness {
    harness_with(duration, None)
}

fn harness_with(duration: u32, progress: Option<Arc<dyn ProgressRepository>>) -> Harness {
    let repo = InMemoryRepository::new();
    repo.insert_exam(three_question_exam(duration)).unwrap();
    let sink = Arc::new(CountingSink::default());
    let storage = Storage::from_repo(repo.clone());
    let service = SessionLoopService::new(
        fixed_clock(),
        Arc::clone(&storage.exams),
        progress.unwrap_or_else(|| Arc::clone(&storage.progress)),
        sink.clone(),
    );
    Harness {
        repo,
        sink,
        service,
    }
}

impl Harness {
    async fn start(&self, scope: SessionScope) -> ExamSession {
        self.service
            .start_session(&ExamId::new("e1"), scope)
            .await
            .unwrap()
    }

    fn calls(&self) -> usize {
        self.sink.calls.load(Ordering::SeqCst)
    }
}

fn blank(position: usize, value: &str) -> AnswerPatch {
    AnswerPatch::Blank {
        position,
        value: value.into(),
    }
}

fn entry(key: &str, value: &str) -> AnswerPatch {
    AnswerPatch::Entry {
        key: key.into(),
        value: value.into(),
    }
}

#[tokio::test]
async fn scenario_a_assembles_each_answer_shape() {
    let h = harness(3600);
    let mut session = h.start(SessionScope::Anonymous).await;

    session.set_answer(q(1), AnswerPatch::Replace("B".into())).unwrap();
    session.set_answer(q(2), blank(0, "red")).unwrap();
    session.set_answer(q(2), blank(1, "blue")).unwrap();
    session.set_answer(q(3), entry("0", "X")).unwrap();
    session.set_answer(q(3), entry("1", "Y")).unwrap();

    assert_eq!(session.answer(q(1)), Some(&AnswerValue::Scalar("B".into())));
    assert_eq!(
        session.answer(q(2)),
        Some(&AnswerValue::OrderedList(vec!["red".into(), "blue".into()]))
    );
    assert_eq!(
        session.answer(q(3)),
        Some(&AnswerValue::KeyedMap(BTreeMap::from([
            ("0".to_string(), "X".to_string()),
            ("1".to_string(), "Y".to_string()),
        ])))
    );
    assert_eq!(
        session.answers().answered_indices().into_iter().collect::<Vec<_>>(),
        vec![q(1), q(2), q(3)]
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_b_expiry_submits_exactly_once() {
    let h = harness(5);
    let session = h.start(SessionScope::Anonymous).await;

    let (events_tx, mut events_rx) = mpsc::channel(64);
    let (_commands_tx, commands_rx) = mpsc::channel(8);
    let mut session = SessionRunner::new(session, events_tx)
        .run(commands_rx)
        .await;

    assert_eq!(session.timer_state(), TimerState::AutoSubmitted);
    assert_eq!(h.calls(), 1);
    assert_eq!(session.tick(), Tick::Idle);
    assert_eq!(session.remaining_secs(), 0);

    let mut timer_updates = Vec::new();
    let mut submitted = 0;
    while let Ok(event) = events_rx.try_recv() {
        match event {
            SessionEvent::Timer(update) => timer_updates.push(update.remaining_secs),
            SessionEvent::Submitted { trigger, .. } => {
                assert_eq!(trigger, SubmitTrigger::Expiry);
                submitted += 1;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(timer_updates, vec![4, 3, 2, 1, 0]);
    assert_eq!(submitted, 1);

    let submission = h
        .sink
        .get_submission(session.submission_id().unwrap())
        .await
        .unwrap();
    assert_eq!(submission.time_taken_secs(), 5);
    assert!(submission.completion_percent().abs() < f64::EPSILON);
}

#[tokio::test]
async fn expiry_processed_first_wins_the_race() {
    let h = harness(2);
    let mut session = h.start(SessionScope::Anonymous).await;

    assert!(matches!(session.tick(), Tick::Running(_)));
    assert_eq!(session.tick(), Tick::Expired);

    // both triggers land in the same turn; expiry is handled first
    session.auto_submit().await.unwrap();
    assert!(matches!(
        session.submit(true).await,
        Err(SubmitError::Rejected(_))
    ));
    assert!(matches!(
        session.auto_submit().await,
        Err(SubmitError::Rejected(_))
    ));
    assert_eq!(h.calls(), 1);
    assert_eq!(session.timer_state(), TimerState::AutoSubmitted);
}

#[tokio::test]
async fn manual_submission_failure_allows_retry() {
    let h = harness(60);
    let mut session = h.start(SessionScope::User(UserId::new("u1"))).await;
    session.set_answer(q(1), AnswerPatch::Replace("A".into())).unwrap();
    let key = ProgressKey::new(ExamId::new("e1"), SessionScope::User(UserId::new("u1")));

    h.sink.failing.store(true, Ordering::SeqCst);
    assert!(matches!(
        session.submit(true).await,
        Err(SubmitError::Collaborator(_))
    ));
    assert_eq!(session.timer_state(), TimerState::Running);
    assert_eq!(session.answer(q(1)), Some(&AnswerValue::Scalar("A".into())));
    assert!(session.wait_for_saves().await);
    assert!(h.repo.load_progress(&key).await.unwrap().is_some());
    assert!(matches!(session.tick(), Tick::Running(_)));

    h.sink.failing.store(false, Ordering::SeqCst);
    let id = session.submit(true).await.unwrap();
    assert_eq!(h.calls(), 2);
    assert_eq!(session.timer_state(), TimerState::ManuallySubmitted);
    assert!(h.repo.load_progress(&key).await.unwrap().is_none());

    let submission = h.sink.get_submission(&id).await.unwrap();
    assert_eq!(submission.submitter(), "u1");
    assert_eq!(submission.trigger(), SubmitTrigger::Manual);
    assert_eq!(submission.time_taken_secs(), 1);
}

#[tokio::test]
async fn failed_expiry_submission_leaves_an_overdue_snapshot() {
    let h = harness(1);
    let mut session = h.start(SessionScope::Anonymous).await;
    session.next().unwrap();

    h.sink.failing.store(true, Ordering::SeqCst);
    assert_eq!(session.tick(), Tick::Expired);
    assert!(session.auto_submit().await.is_err());
    assert_eq!(session.timer_state(), TimerState::AutoSubmitted);
    assert!(matches!(
        session.submit(true).await,
        Err(SubmitError::Rejected(_))
    ));

    // the next start expires immediately and submits again
    h.sink.failing.store(false, Ordering::SeqCst);
    let mut retry = h.start(SessionScope::Anonymous).await;
    assert_eq!(retry.timer_state(), TimerState::Expiring);
    assert_eq!(retry.current_index(), q(2));
    retry.auto_submit().await.unwrap();
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn resume_then_save_is_idempotent() {
    let h = harness(600);
    let mut session = h.start(SessionScope::Anonymous).await;
    session.set_answer(q(2), blank(1, "blue")).unwrap();
    session.toggle_review(q(2)).unwrap();
    session.go_to(q(3)).unwrap();
    for _ in 0..7 {
        session.tick();
    }
    assert!(!session.next().unwrap());
    session.previous().unwrap();

    assert!(session.wait_for_saves().await);
    let key = ProgressKey::new(ExamId::new("e1"), SessionScope::Anonymous);
    let persisted = h.repo.load_progress(&key).await.unwrap().unwrap();
    assert_eq!(persisted.elapsed_secs, 7);

    let resumed = h.start(SessionScope::Anonymous).await;
    assert_eq!(resumed.remaining_secs(), 593);
    assert!(resumed.checkpoint().await);

    let saved_again = h.repo.load_progress(&key).await.unwrap().unwrap();
    assert_eq!(saved_again, persisted);
    assert_eq!(
        serde_json::to_string(&saved_again).unwrap(),
        serde_json::to_string(&persisted).unwrap()
    );
}

#[tokio::test]
async fn autosave_failure_keeps_the_in_memory_change() {
    let h = harness_with(60, Some(Arc::new(ReadOnlyProgress)));
    let mut session = h.start(SessionScope::Anonymous).await;

    session.set_answer(q(1), AnswerPatch::Replace("C".into())).unwrap();
    assert!(session.go_to(q(3)).unwrap());
    assert_eq!(session.answer(q(1)), Some(&AnswerValue::Scalar("C".into())));
    assert_eq!(session.current_index(), q(3));
    assert!(!session.wait_for_saves().await);

    session.submit(true).await.unwrap();
    assert_eq!(h.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn runner_applies_commands_between_ticks() {
    let h = harness(3600);
    let session = h.start(SessionScope::Anonymous).await;
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let (commands_tx, commands_rx) = mpsc::channel(8);

    let runner = tokio::spawn(SessionRunner::new(session, events_tx).run(commands_rx));

    commands_tx
        .send(SessionCommand::Answer {
            index: q(1),
            patch: AnswerPatch::Replace("D".into()),
        })
        .await
        .unwrap();
    commands_tx.send(SessionCommand::GoTo(q(3))).await.unwrap();
    commands_tx.send(SessionCommand::GoTo(q(0))).await.unwrap();
    commands_tx
        .send(SessionCommand::ToggleReview(None))
        .await
        .unwrap();
    commands_tx
        .send(SessionCommand::Submit { confirmed: false })
        .await
        .unwrap();
    commands_tx
        .send(SessionCommand::Submit { confirmed: true })
        .await
        .unwrap();

    let session = runner.await.unwrap();
    assert_eq!(session.timer_state(), TimerState::ManuallySubmitted);

    let mut seen = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        if !matches!(event, SessionEvent::Timer(_)) {
            seen.push(event);
        }
    }
    assert!(matches!(seen[0], SessionEvent::Answered { .. }));
    assert_eq!(
        seen[1],
        SessionEvent::Moved {
            current: q(3),
            part: Some(2),
        }
    );
    assert!(matches!(seen[2], SessionEvent::Rejected(_)));
    assert_eq!(
        seen[3],
        SessionEvent::ReviewToggled {
            index: q(3),
            marked: true,
        }
    );
    assert_eq!(seen[4], SessionEvent::ConfirmationRequired);
    assert!(matches!(
        seen[5],
        SessionEvent::Submitted {
            trigger: SubmitTrigger::Manual,
            ..
        }
    ));
    assert_eq!(h.calls(), 1);
}

#[tokio::test]
async fn finished_session_refuses_edits() {
    let h = harness(60);
    let mut session = h.start(SessionScope::Anonymous).await;
    session.submit(true).await.unwrap();
    assert!(matches!(
        session.toggle_review(q(1)),
        Err(SessionError::Finished)
    ));
    assert!(matches!(session.next(), Err(SessionError::Finished)));
}

#[tokio::test(start_paused = true)]
async fn slow_autosaves_do_not_hold_up_the_countdown() {
    let slow = Arc::new(SlowProgress::default());
    let h = harness_with(30, Some(slow.clone()));
    let session = h.start(SessionScope::Anonymous).await;
    let (events_tx, mut events_rx) = mpsc::channel(64);
    let (commands_tx, commands_rx) = mpsc::channel(8);

    let started = Instant::now();
    let runner = tokio::spawn(SessionRunner::new(session, events_tx).run(commands_rx));
    for index in [2, 3, 1, 2, 3, 1] {
        commands_tx.send(SessionCommand::GoTo(q(index))).await.unwrap();
    }

    let mut expired_at = None;
    let mut moves = 0;
    while let Some(event) = events_rx.recv().await {
        match event {
            SessionEvent::Timer(update) if update.remaining_secs == 0 && expired_at.is_none() => {
                expired_at = Some(started.elapsed());
            }
            SessionEvent::Moved { .. } => moves += 1,
            _ => {}
        }
    }
    let session = runner.await.unwrap();

    let expired_at = expired_at.unwrap();
    assert!(
        expired_at >= Duration::from_secs(30) && expired_at < Duration::from_secs(31),
        "expired after {expired_at:?}"
    );
    assert_eq!(moves, 6);
    assert_eq!(session.timer_state(), TimerState::AutoSubmitted);
    assert_eq!(h.calls(), 1);
    // queued snapshots collapse while a save is in flight
    assert!(slow.saves.load(Ordering::SeqCst) <= 2);
    drop(commands_tx);
}

#[tokio::test(start_paused = true)]
async fn countdown_catches_up_after_a_stalled_submission() {
    let h = harness(60);
    h.sink.failing.store(true, Ordering::SeqCst);
    h.sink.latency_secs.store(10, Ordering::SeqCst);
    let session = h.start(SessionScope::Anonymous).await;
    let (events_tx, mut events_rx) = mpsc::channel(128);
    let (commands_tx, commands_rx) = mpsc::channel(8);

    let runner = tokio::spawn(SessionRunner::new(session, events_tx).run(commands_rx));
    commands_tx
        .send(SessionCommand::Submit { confirmed: true })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20_500)).await;
    commands_tx.send(SessionCommand::Status).await.unwrap();

    let mut failed = false;
    let status = loop {
        match events_rx.recv().await.unwrap() {
            SessionEvent::SubmissionFailed { trigger, .. } => {
                assert_eq!(trigger, SubmitTrigger::Manual);
                failed = true;
            }
            SessionEvent::Status(status) => break status,
            _ => {}
        }
    };
    assert!(failed);
    assert_eq!(status.state, TimerState::Running);
    // twenty seconds of wall-clock time, ten of them spent submitting
    assert!(
        (39..=41).contains(&status.timer.remaining_secs),
        "remaining {}",
        status.timer.remaining_secs
    );

    drop(commands_tx);
    let session = runner.await.unwrap();
    assert_eq!(session.timer_state(), TimerState::Running);
    assert_eq!(h.calls(), 1);
}
