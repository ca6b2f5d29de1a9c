// tests/session_flow_tests.rs

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use exam_session::{
    SessionManager, SessionNotice,
    backend::ExamBackend,
    clock::ManualClock,
    config::SessionConfig,
    error::{ActionError, BackendError, SessionInitError, StoreError, SubmissionError},
    events::{ChannelEventSource, EnvironmentSignal, SignalEmitter},
    models::{
        exam::{
            SaveProgressRequest, SaveProgressResponse, StartSessionResponse, SubmitResult,
            SubmitSessionRequest, SubmitTrigger, TrackActivityRequest,
        },
        question::Question,
        security_event::SecurityEventType,
        session::SessionSnapshot,
    },
    store::{KeyValueStore, MemoryStore, SnapshotStore},
    submission::SubmissionState,
};
use tokio::sync::{Notify, broadcast};
use tokio::time::Instant;

const EXAM_ID: i64 = 7;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 14, 9, 0, 0).unwrap()
}

fn questions(n: i64) -> Vec<Question> {
    (1..=n)
        .map(|id| Question {
            id,
            question_type: "single".to_string(),
            content: format!("Question {}", id),
            options: vec!["A".to_string(), "B".to_string(), "C".to_string(), "D".to_string()],
        })
        .collect()
}

/// In-process backend that records every call.
struct FakeBackend {
    start: Mutex<Option<StartSessionResponse>>,
    saves: Mutex<Vec<(Instant, SaveProgressRequest)>>,
    submits: Mutex<Vec<SubmitSessionRequest>>,
    activity: Mutex<Vec<TrackActivityRequest>>,
    /// Number of upcoming submit calls that fail.
    failing_submits: AtomicUsize,
    fail_activity: AtomicBool,
    hold_submits: AtomicBool,
    hold_saves: AtomicBool,
    release: Notify,
}

impl FakeBackend {
    fn new(duration_seconds: u64) -> Arc<Self> {
        Arc::new(Self {
            start: Mutex::new(Some(StartSessionResponse {
                session_id: "attempt-1".to_string(),
                resumed: false,
                start_time: t0(),
                duration_seconds,
                questions: questions(5),
                answers: HashMap::new(),
                current_index: None,
            })),
            saves: Mutex::new(Vec::new()),
            submits: Mutex::new(Vec::new()),
            activity: Mutex::new(Vec::new()),
            failing_submits: AtomicUsize::new(0),
            fail_activity: AtomicBool::new(false),
            hold_submits: AtomicBool::new(false),
            hold_saves: AtomicBool::new(false),
            release: Notify::new(),
        })
    }

    fn resume_server_side(&self) {
        if let Some(start) = self.start.lock().unwrap().as_mut() {
            start.resumed = true;
        }
    }

    fn submit_count(&self) -> usize {
        self.submits.lock().unwrap().len()
    }

    fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }
}

#[async_trait]
impl ExamBackend for FakeBackend {
    async fn start_session(&self, _exam_id: i64) -> Result<StartSessionResponse, BackendError> {
        self.start
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::Transport("connection refused".to_string()))
    }

    async fn save_progress(
        &self,
        req: &SaveProgressRequest,
    ) -> Result<SaveProgressResponse, BackendError> {
        self.saves.lock().unwrap().push((Instant::now(), req.clone()));
        if self.hold_saves.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        Ok(SaveProgressResponse {
            acknowledged: true,
            saved_at: None,
        })
    }

    async fn submit_session(
        &self,
        req: &SubmitSessionRequest,
    ) -> Result<SubmitResult, BackendError> {
        self.submits.lock().unwrap().push(req.clone());
        if self.hold_submits.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        let failing = self.failing_submits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_submits.store(failing - 1, Ordering::SeqCst);
            return Err(BackendError::Http {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(SubmitResult {
            score: 80.0,
            correct_count: req.answers.len(),
            total_questions: 5,
            passed: true,
            message: "Exam submitted successfully".to_string(),
            review: Vec::new(),
        })
    }

    async fn track_activity(&self, req: &TrackActivityRequest) -> Result<(), BackendError> {
        self.activity.lock().unwrap().push(req.clone());
        if self.fail_activity.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("offline".to_string()));
        }
        Ok(())
    }
}

/// Memory store whose writes can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }
}

struct Harness {
    manager: SessionManager,
    backend: Arc<FakeBackend>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    emitter: SignalEmitter,
    notices: broadcast::Receiver<SessionNotice>,
}

fn config() -> SessionConfig {
    SessionConfig {
        low_time_warnings: Vec::new(),
        ..SessionConfig::default()
    }
}

fn harness_with(backend: Arc<FakeBackend>, store: Arc<MemoryStore>, config: SessionConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let source = Arc::new(ChannelEventSource::new());
    let emitter = source.emitter();
    let manager = SessionManager::new(config, backend.clone(), store.clone(), source, clock.clone());
    let notices = manager.subscribe();
    Harness {
        manager,
        backend,
        store,
        clock,
        emitter,
        notices,
    }
}

fn harness(duration_seconds: u64) -> Harness {
    harness_with(FakeBackend::new(duration_seconds), Arc::new(MemoryStore::new()), config())
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Moves both the wall clock and tokio's timers forward.
async fn advance(h: &Harness, secs: u64) {
    for _ in 0..secs {
        h.clock.advance(chrono::Duration::seconds(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
    }
}

fn stored_snapshot(store: &Arc<MemoryStore>) -> Option<SessionSnapshot> {
    let raw: Arc<dyn KeyValueStore> = store.clone();
    SnapshotStore::new(raw).load(EXAM_ID).unwrap()
}

fn drain(notices: &mut broadcast::Receiver<SessionNotice>) -> Vec<SessionNotice> {
    let mut out = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        out.push(notice);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn start_persists_snapshot_and_arms_countdown() {
    let h = harness(3600);

    let started = h.manager.start(EXAM_ID).await.unwrap();
    assert!(!started.resumed);
    assert_eq!(started.remaining_seconds, 3600);
    assert_eq!(started.question_count, 5);
    assert!(h.manager.is_active());

    let snapshot = stored_snapshot(&h.store).expect("snapshot written at start");
    assert_eq!(snapshot.session_id, "attempt-1");
    assert_eq!(snapshot.start_time, t0());

    advance(&h, 3).await;
    assert_eq!(h.manager.remaining_seconds(), Some(3597));
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_while_running() {
    let h = harness(600);
    h.manager.start(EXAM_ID).await.unwrap();

    assert!(matches!(
        h.manager.start(EXAM_ID).await,
        Err(SessionInitError::AlreadyRunning(EXAM_ID))
    ));
}

#[tokio::test(start_paused = true)]
async fn start_failure_is_fatal_and_retryable() {
    let h = harness(600);
    let response = h.backend.start.lock().unwrap().take();

    assert!(matches!(
        h.manager.start(EXAM_ID).await,
        Err(SessionInitError::Backend(_))
    ));
    assert!(!h.manager.is_active());

    *h.backend.start.lock().unwrap() = response;
    assert!(h.manager.start(EXAM_ID).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn resume_after_two_minutes_uses_server_clock() {
    let backend = FakeBackend::new(3600);
    backend.resume_server_side();
    let store = Arc::new(MemoryStore::new());
    let raw: Arc<dyn KeyValueStore> = store.clone();
    SnapshotStore::new(raw)
        .save(&SessionSnapshot {
            exam_id: EXAM_ID,
            session_id: "attempt-1".to_string(),
            start_time: t0() + chrono::Duration::minutes(10),
            duration_seconds: 3600,
            answers: HashMap::from([(1, "C".to_string()), (4, "A".to_string())]),
            flagged_question_ids: BTreeSet::from([4]),
            current_index: 3,
            saved_at: t0(),
        })
        .unwrap();

    let h = harness_with(backend, store, config());
    h.clock.set(t0() + chrono::Duration::seconds(120));

    let started = h.manager.start(EXAM_ID).await.unwrap();
    assert!(started.resumed);
    assert_eq!(started.remaining_seconds, 3480);

    let session = h.manager.session().unwrap();
    assert_eq!(session.start_time(), t0());
    assert_eq!(session.answers().get(&1).map(String::as_str), Some("C"));
    assert!(session.flagged_question_ids().contains(&4));
    assert_eq!(session.current_index(), 3);
}

#[tokio::test(start_paused = true)]
async fn detached_session_round_trips_through_the_store() {
    let backend = FakeBackend::new(3600);
    let store = Arc::new(MemoryStore::new());
    let first = harness_with(backend.clone(), store.clone(), config());
    first.manager.start(EXAM_ID).await.unwrap();
    first.manager.set_answer(2, "B").unwrap();
    first.manager.set_answer(5, "D").unwrap();
    first.manager.toggle_flag(3).unwrap();
    first.manager.go_to(4);
    let before = first.manager.session().unwrap();
    first.manager.detach();
    assert!(!first.manager.is_active());

    backend.resume_server_side();
    let second = harness_with(backend, store, config());
    let started = second.manager.start(EXAM_ID).await.unwrap();
    let after = second.manager.session().unwrap();

    assert!(started.resumed);
    assert_eq!(after.answers(), before.answers());
    assert_eq!(after.flagged_question_ids(), before.flagged_question_ids());
    assert_eq!(after.current_index(), before.current_index());
}

#[tokio::test(start_paused = true)]
async fn repeated_answers_keep_only_the_last_value_locally() {
    let h = harness(600);
    h.manager.start(EXAM_ID).await.unwrap();

    for option in ["A", "B", "D", "C"] {
        h.manager.set_answer(1, option).unwrap();
    }

    let snapshot = stored_snapshot(&h.store).unwrap();
    assert_eq!(snapshot.answers, HashMap::from([(1, "C".to_string())]));
}

#[tokio::test(start_paused = true)]
async fn flag_then_unflag_leaves_question_unflagged() {
    let h = harness(600);
    h.manager.start(EXAM_ID).await.unwrap();

    assert_eq!(h.manager.toggle_flag(2), Ok(true));
    assert_eq!(h.manager.toggle_flag(2), Ok(false));

    assert!(stored_snapshot(&h.store).unwrap().flagged_question_ids.is_empty());
    assert_eq!(h.manager.progress().unwrap().flagged, 0);
}

#[tokio::test(start_paused = true)]
async fn navigation_clamps_and_persists() {
    let h = harness(600);
    h.manager.start(EXAM_ID).await.unwrap();

    assert!(!h.manager.previous());
    assert!(h.manager.go_to(4));
    assert!(!h.manager.next());
    assert!(!h.manager.go_to(5));
    assert_eq!(h.manager.current_question().unwrap().id, 5);
    assert_eq!(stored_snapshot(&h.store).unwrap().current_index, 4);

    assert!(h.manager.previous());
    assert_eq!(h.manager.session().unwrap().current_index(), 3);
}

#[tokio::test(start_paused = true)]
async fn invalid_actions_are_rejected_without_side_effects() {
    let h = harness(600);
    assert_eq!(h.manager.set_answer(1, "A"), Err(ActionError::NoActiveSession));

    h.manager.start(EXAM_ID).await.unwrap();
    assert_eq!(h.manager.set_answer(42, "A"), Err(ActionError::UnknownQuestion(42)));
    assert!(matches!(
        h.manager.set_answer(1, "E"),
        Err(ActionError::InvalidOption { question_id: 1, .. })
    ));
    assert!(h.manager.session().unwrap().answers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn five_quick_edits_make_one_remote_save() {
    let h = harness(3600);
    h.manager.start(EXAM_ID).await.unwrap();
    let started_at = Instant::now();

    for question_id in 1..=5 {
        h.manager.set_answer(question_id, "B").unwrap();
        advance(&h, 2).await;
    }
    assert_eq!(h.backend.save_count(), 0);

    advance(&h, 20).await;

    let saves = h.backend.saves.lock().unwrap().clone();
    assert_eq!(saves.len(), 1);
    let (at, request) = &saves[0];
    assert_eq!(at.duration_since(started_at), Duration::from_secs(30));
    assert_eq!(request.answers.len(), 5);
    assert!(request.answers.values().all(|option| option == "B"));

    // Nothing new to push.
    advance(&h, 30).await;
    assert_eq!(h.backend.save_count(), 1);
    assert!(h.manager.session().unwrap().last_saved_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn manual_and_timeout_triggers_race_to_one_submission() {
    let h = harness(5);
    h.manager.start(EXAM_ID).await.unwrap();
    h.manager.set_answer(1, "A").unwrap();
    advance(&h, 4).await;

    h.backend.hold_submits.store(true, Ordering::SeqCst);
    let manual = {
        let manager = h.manager.clone();
        tokio::spawn(async move { manager.submit(SubmitTrigger::Manual).await })
    };
    settle().await;
    assert_eq!(h.manager.submission_state(), SubmissionState::Submitting);

    // Expiry fires while the manual submission is still in flight.
    advance(&h, 2).await;
    assert_eq!(h.backend.submit_count(), 1);

    h.backend.release.notify_one();
    let result = manual.await.unwrap().unwrap();
    assert!(result.passed);

    assert_eq!(h.backend.submit_count(), 1);
    assert_eq!(h.backend.submits.lock().unwrap()[0].trigger, SubmitTrigger::Manual);
    assert_eq!(h.manager.submission_state(), SubmissionState::Submitted);
    assert!(matches!(
        h.manager.submit(SubmitTrigger::Manual).await,
        Err(SubmissionError::AlreadySubmitted)
    ));
}

#[tokio::test(start_paused = true)]
async fn expiry_during_failed_manual_submission_is_resubmitted() {
    let h = harness(5);
    h.backend.failing_submits.store(1, Ordering::SeqCst);
    h.manager.start(EXAM_ID).await.unwrap();
    h.manager.set_answer(1, "A").unwrap();
    advance(&h, 4).await;

    h.backend.hold_submits.store(true, Ordering::SeqCst);
    let manual = {
        let manager = h.manager.clone();
        tokio::spawn(async move { manager.submit(SubmitTrigger::Manual).await })
    };
    settle().await;

    // Expiry's own attempt is turned away while the manual one is in flight.
    advance(&h, 2).await;
    assert_eq!(h.backend.submit_count(), 1);

    h.backend.hold_submits.store(false, Ordering::SeqCst);
    h.backend.release.notify_one();
    assert!(matches!(manual.await.unwrap(), Err(SubmissionError::Network(_))));
    assert_eq!(h.manager.submission_state(), SubmissionState::InProgress);

    advance(&h, 5).await;
    assert_eq!(h.backend.submit_count(), 2);
    assert_eq!(h.backend.submits.lock().unwrap()[1].trigger, SubmitTrigger::Timeout);
    assert_eq!(h.manager.submission_state(), SubmissionState::Submitted);
    assert!(stored_snapshot(&h.store).is_none());
}

#[tokio::test(start_paused = true)]
async fn answers_lock_with_the_submitted_snapshot() {
    let h = harness(600);
    h.manager.start(EXAM_ID).await.unwrap();
    h.manager.set_answer(1, "A").unwrap();
    h.backend.hold_submits.store(true, Ordering::SeqCst);

    let submit = {
        let manager = h.manager.clone();
        tokio::spawn(async move { manager.submit(SubmitTrigger::Manual).await })
    };
    settle().await;

    assert_eq!(h.manager.set_answer(2, "B"), Err(ActionError::Locked));
    assert_eq!(h.manager.toggle_flag(2), Err(ActionError::Locked));

    h.backend.release.notify_one();
    submit.await.unwrap().unwrap();
    assert_eq!(
        h.backend.submits.lock().unwrap()[0].answers,
        HashMap::from([(1, "A".to_string())])
    );
}

#[tokio::test(start_paused = true)]
async fn failed_local_write_is_surfaced() {
    let store = Arc::new(FlakyStore::default());
    let source = Arc::new(ChannelEventSource::new());
    let manager = SessionManager::new(
        config(),
        FakeBackend::new(600),
        store.clone(),
        source,
        Arc::new(ManualClock::new(t0())),
    );
    let mut notices = manager.subscribe();
    manager.start(EXAM_ID).await.unwrap();

    store.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        manager.set_answer(1, "B"),
        Err(ActionError::NotPersisted(_))
    ));
    assert_eq!(
        manager.session().unwrap().answers().get(&1).map(String::as_str),
        Some("B")
    );
    assert!(manager.go_to(2));
    assert!(
        drain(&mut notices)
            .iter()
            .any(|n| matches!(n, SessionNotice::LocalSaveFailed { .. }))
    );

    // The next successful write carries everything kept in memory.
    store.fail_writes.store(false, Ordering::SeqCst);
    manager.set_answer(2, "C").unwrap();
    let raw: Arc<dyn KeyValueStore> = store.clone();
    let snapshot = SnapshotStore::new(raw).load(EXAM_ID).unwrap().unwrap();
    assert_eq!(snapshot.answers.len(), 2);
    assert_eq!(snapshot.current_index, 2);
}

#[tokio::test(start_paused = true)]
async fn expiry_submits_once_and_tears_down() {
    let mut h = harness(3);
    h.manager.start(EXAM_ID).await.unwrap();
    h.manager.set_answer(2, "C").unwrap();

    advance(&h, 10).await;

    assert_eq!(h.backend.submit_count(), 1);
    let request = h.backend.submits.lock().unwrap()[0].clone();
    assert_eq!(request.trigger, SubmitTrigger::Timeout);
    assert_eq!(request.answers, HashMap::from([(2, "C".to_string())]));

    assert!(stored_snapshot(&h.store).is_none());
    assert!(h.manager.session().is_none());
    assert!(h.manager.result().is_some());
    assert_eq!(h.manager.set_answer(2, "A"), Err(ActionError::NoActiveSession));

    let notices = drain(&mut h.notices);
    assert_eq!(notices.iter().filter(|n| matches!(n, SessionNotice::Expired)).count(), 1);
    assert!(notices.iter().any(|n| matches!(n, SessionNotice::Submitted { .. })));

    // Timers are gone: no more ticks or saves.
    advance(&h, 60).await;
    assert!(drain(&mut h.notices).is_empty());
    assert_eq!(h.backend.save_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_timeout_submission_is_retried() {
    let h = harness(2);
    h.backend.failing_submits.store(1, Ordering::SeqCst);
    h.manager.start(EXAM_ID).await.unwrap();

    advance(&h, 3).await;
    assert_eq!(h.backend.submit_count(), 1);
    assert_eq!(h.manager.submission_state(), SubmissionState::InProgress);
    assert_eq!(h.manager.set_answer(1, "A"), Err(ActionError::TimeExpired));

    advance(&h, 5).await;
    assert_eq!(h.backend.submit_count(), 2);
    assert_eq!(h.manager.submission_state(), SubmissionState::Submitted);
}

#[tokio::test(start_paused = true)]
async fn timeout_retries_are_bounded() {
    let h = harness_with(
        FakeBackend::new(2),
        Arc::new(MemoryStore::new()),
        SessionConfig {
            max_timeout_retries: 2,
            ..config()
        },
    );
    h.backend.failing_submits.store(100, Ordering::SeqCst);
    h.manager.start(EXAM_ID).await.unwrap();

    advance(&h, 60).await;

    // The expiry attempt plus two retries.
    assert_eq!(h.backend.submit_count(), 3);
    assert!(h.manager.is_active());
    assert!(stored_snapshot(&h.store).is_some());
}

#[tokio::test(start_paused = true)]
async fn failed_manual_submission_keeps_answers() {
    let mut h = harness(600);
    h.backend.failing_submits.store(1, Ordering::SeqCst);
    h.manager.start(EXAM_ID).await.unwrap();
    h.manager.set_answer(3, "D").unwrap();

    let failed = h.manager.submit(SubmitTrigger::Manual).await;
    assert!(matches!(failed, Err(SubmissionError::Network(_))));
    assert_eq!(h.manager.submission_state(), SubmissionState::InProgress);
    assert_eq!(
        stored_snapshot(&h.store).unwrap().answers.get(&3).map(String::as_str),
        Some("D")
    );
    assert!(drain(&mut h.notices).iter().any(|n| matches!(
        n,
        SessionNotice::SubmissionFailed { trigger: SubmitTrigger::Manual, .. }
    )));

    // Manual failures are not retried behind the user's back.
    advance(&h, 30).await;
    assert_eq!(h.backend.submit_count(), 1);

    h.manager.set_answer(4, "A").unwrap();
    let result = h.manager.submit(SubmitTrigger::Manual).await.unwrap();
    assert_eq!(result.correct_count, 2);
    assert_eq!(h.backend.submit_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_autosave_ack_after_submission_is_ignored() {
    let mut h = harness(3600);
    h.manager.start(EXAM_ID).await.unwrap();
    h.manager.set_answer(1, "A").unwrap();
    h.backend.hold_saves.store(true, Ordering::SeqCst);

    advance(&h, 30).await;
    assert_eq!(h.backend.save_count(), 1);

    h.manager.submit(SubmitTrigger::Manual).await.unwrap();
    drain(&mut h.notices);

    h.backend.release.notify_one();
    settle().await;

    assert!(
        !drain(&mut h.notices)
            .iter()
            .any(|n| matches!(n, SessionNotice::Saved { .. }))
    );
    assert!(stored_snapshot(&h.store).is_none());
}

#[tokio::test(start_paused = true)]
async fn tab_switches_are_reported_once_per_flip() {
    let h = harness(600);
    h.manager.start(EXAM_ID).await.unwrap();

    for _ in 0..2 {
        h.emitter.emit(EnvironmentSignal::VisibilityChanged { hidden: true });
        advance(&h, 3).await;
        h.emitter.emit(EnvironmentSignal::VisibilityChanged { hidden: false });
        advance(&h, 3).await;
    }

    let tab_switches: Vec<_> = h
        .backend
        .activity
        .lock()
        .unwrap()
        .iter()
        .filter(|a| a.event_type == SecurityEventType::TabSwitch)
        .cloned()
        .collect();
    assert_eq!(tab_switches.len(), 2);
    assert!(tab_switches.iter().all(|a| a.session_id == "attempt-1"));
}

#[tokio::test(start_paused = true)]
async fn security_reporting_failures_never_touch_the_exam() {
    let h = harness(600);
    h.backend.fail_activity.store(true, Ordering::SeqCst);
    h.manager.start(EXAM_ID).await.unwrap();

    h.emitter.emit(EnvironmentSignal::Copy);
    h.emitter.emit(EnvironmentSignal::Paste);
    settle().await;

    assert_eq!(h.backend.activity.lock().unwrap().len(), 2);
    assert_eq!(h.manager.security_events().len(), 2);
    assert!(h.manager.is_active());
    h.manager.set_answer(1, "A").unwrap();
}

#[tokio::test(start_paused = true)]
async fn idle_period_is_reported() {
    let h = harness(3600);
    h.manager.start(EXAM_ID).await.unwrap();

    advance(&h, 61).await;
    assert!(h.manager.is_idle());

    h.emitter
        .emit(EnvironmentSignal::Interaction(exam_session::events::InteractionKind::Pointer));
    settle().await;
    assert!(!h.manager.is_idle());

    let types: Vec<_> = h
        .manager
        .security_events()
        .iter()
        .map(|e| e.event_type())
        .collect();
    assert_eq!(types, vec![SecurityEventType::Idle, SecurityEventType::Active]);
}

#[tokio::test(start_paused = true)]
async fn low_time_warning_fires_once_per_threshold() {
    let mut h = harness_with(
        FakeBackend::new(65),
        Arc::new(MemoryStore::new()),
        SessionConfig {
            low_time_warnings: vec![60, 10],
            ..config()
        },
    );
    h.manager.start(EXAM_ID).await.unwrap();

    advance(&h, 30).await;

    let thresholds: Vec<u64> = drain(&mut h.notices)
        .into_iter()
        .filter_map(|n| match n {
            SessionNotice::LowTime { threshold, .. } => Some(threshold),
            _ => None,
        })
        .collect();
    assert_eq!(thresholds, vec![60]);
}

#[tokio::test(start_paused = true)]
async fn abandon_removes_local_snapshot() {
    let h = harness(600);
    h.manager.start(EXAM_ID).await.unwrap();
    h.manager.set_answer(1, "A").unwrap();

    h.manager.abandon();

    assert!(stored_snapshot(&h.store).is_none());
    assert!(!h.manager.is_active());
    assert!(matches!(
        h.manager.submit(SubmitTrigger::Manual).await,
        Err(SubmissionError::NoActiveSession)
    ));
}

#[tokio::test(start_paused = true)]
async fn progress_lists_unanswered_questions_in_order() {
    let h = harness(600);
    h.manager.start(EXAM_ID).await.unwrap();
    h.manager.set_answer(2, "A").unwrap();
    h.manager.set_answer(4, "B").unwrap();
    h.manager.toggle_flag(5).unwrap();

    let progress = h.manager.progress().unwrap();
    assert_eq!(progress.total, 5);
    assert_eq!(progress.answered, 2);
    assert_eq!(progress.flagged, 1);
    assert_eq!(progress.unanswered, vec![1, 3, 5]);
}
