// src/session/manager.rs

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::autosave::{AutosavePersistor, ProgressSink};
use crate::backend::ExamBackend;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::countdown::Countdown;
use crate::error::{
    ActionError, AutosaveTransientError, SecurityReportError, SessionInitError, SubmissionError,
};
use crate::events::EventSource;
use crate::models::{
    exam::{SaveProgressRequest, SubmitResult, SubmitSessionRequest, SubmitTrigger, TrackActivityRequest},
    question::Question,
    security_event::SecurityEvent,
    session::ExamSession,
};
use crate::resume::{ResumeOutcome, SessionResumer};
use crate::security::{SecurityMonitor, SecurityReporter};
use crate::session::{Progress, SessionNotice, controller};
use crate::store::{KeyValueStore, SnapshotStore};
use crate::submission::{SubmissionCoordinator, SubmissionState};

const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    Starting,
    Active,
    Submitted,
}

#[derive(Default)]
struct ManagerState {
    /// Bumped on every start and teardown. Async completions carry the
    /// generation they were issued under and are dropped when it moved on.
    generation: u64,
    phase: Phase,
    session: Option<ExamSession>,
    questions: Vec<Question>,
    /// Local mutation counter, compared against the last acknowledged push.
    revision: u64,
    pushed_revision: u64,
    warned: BTreeSet<u64>,
    timeout_retries: u32,
    result: Option<SubmitResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    pub resumed: bool,
    pub remaining_seconds: u64,
    pub question_count: usize,
}

/// Root of a timed exam attempt.
///
/// Sole owner of the mutable session state. The countdown, autosave loop,
/// security monitor and timeout retry are fields with an explicit
/// `start`/teardown lifecycle; their callbacks go back through the manager
/// instead of touching the session themselves.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    backend: Arc<dyn ExamBackend>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSource>,
    resumer: SessionResumer,
    autosave: AutosavePersistor,
    countdown: Countdown,
    monitor: SecurityMonitor,
    coordinator: SubmissionCoordinator,
    retry: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<ManagerState>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn ExamBackend>,
        store: Arc<dyn KeyValueStore>,
        events: Arc<dyn EventSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let snapshots = SnapshotStore::new(store);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let inner = Inner {
            resumer: SessionResumer::new(Arc::clone(&backend), snapshots.clone()),
            autosave: AutosavePersistor::new(snapshots),
            countdown: Countdown::new(Arc::clone(&clock), config.tick_interval),
            monitor: SecurityMonitor::new(
                Arc::clone(&clock),
                config.idle_timeout,
                config.require_fullscreen,
            ),
            coordinator: SubmissionCoordinator::new(Arc::clone(&backend)),
            retry: Mutex::new(None),
            state: Mutex::new(ManagerState::default()),
            notices,
            config,
            backend,
            clock,
            events,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    /// Starts or resumes the attempt for `exam_id`, then arms the countdown,
    /// the autosave loop and the security monitor.
    pub async fn start(&self, exam_id: i64) -> Result<StartOutcome, SessionInitError> {
        {
            let mut state = self.inner.lock();
            if matches!(state.phase, Phase::Starting | Phase::Active) {
                let running = state.session.as_ref().map_or(exam_id, |s| s.exam_id());
                return Err(SessionInitError::AlreadyRunning(running));
            }
            state.phase = Phase::Starting;
        }

        match self.inner.resumer.resume(exam_id).await {
            Ok(outcome) => self.inner.activate(outcome),
            Err(e) => {
                let mut state = self.inner.lock();
                if state.phase == Phase::Starting {
                    state.phase = Phase::Idle;
                }
                Err(e)
            }
        }
    }

    pub fn set_answer(&self, question_id: i64, option: &str) -> Result<(), ActionError> {
        self.inner
            .mutate(|session, questions| controller::set_answer(session, questions, question_id, option))
    }

    pub fn clear_answer(&self, question_id: i64) -> Result<bool, ActionError> {
        self.inner
            .mutate(|session, questions| controller::clear_answer(session, questions, question_id))
    }

    /// Returns whether the question is flagged afterwards.
    pub fn toggle_flag(&self, question_id: i64) -> Result<bool, ActionError> {
        self.inner
            .mutate(|session, questions| controller::toggle_flag(session, questions, question_id))
    }

    /// Moves to `index`; out-of-range or inactive requests are ignored.
    pub fn go_to(&self, index: usize) -> bool {
        self.inner.navigate(|_, _| Some(index))
    }

    pub fn next(&self) -> bool {
        self.inner.navigate(|current, _| current.checked_add(1))
    }

    pub fn previous(&self) -> bool {
        self.inner.navigate(|current, _| current.checked_sub(1))
    }

    /// Submits the attempt. Concurrent or repeated calls are rejected by the
    /// submission guard without reaching the backend.
    pub async fn submit(&self, trigger: SubmitTrigger) -> Result<SubmitResult, SubmissionError> {
        let (generation, request) = {
            let state = self.inner.lock();
            match (state.phase, state.session.as_ref()) {
                (Phase::Submitted, _) => return Err(SubmissionError::AlreadySubmitted),
                (Phase::Active, Some(session)) => {
                    // Taken under the state lock: no mutation can slip in
                    // between the answer snapshot and the guard.
                    self.inner.coordinator.begin(session.exam_id(), trigger)?;
                    (
                        state.generation,
                        SubmitSessionRequest {
                            exam_id: session.exam_id(),
                            session_id: session.session_id().to_string(),
                            answers: session.answers().clone(),
                            trigger,
                        },
                    )
                }
                _ => return Err(SubmissionError::NoActiveSession),
            }
        };

        match self.inner.coordinator.send(trigger, request).await {
            Ok(result) => {
                self.inner.finish(generation, &result);
                Ok(result)
            }
            Err(SubmissionError::Network(e)) => {
                self.inner.notify(SessionNotice::SubmissionFailed {
                    trigger,
                    message: e.to_string(),
                });
                // A timeout rejected while this call was in flight is not
                // repeated by the countdown, so expiry re-arms from here.
                if trigger == SubmitTrigger::Timeout || self.inner.countdown.has_expired() {
                    self.inner.schedule_timeout_retry(generation);
                }
                Err(SubmissionError::Network(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Logout: stops everything and deletes the local snapshot.
    pub fn abandon(&self) {
        if let Some(exam_id) = self.inner.teardown(Phase::Idle) {
            self.inner.autosave.clear_local(exam_id);
            tracing::info!(exam_id, "Exam session abandoned");
        }
    }

    /// Unmount: stops everything but keeps the local snapshot for a later resume.
    pub fn detach(&self) {
        if let Some(exam_id) = self.inner.teardown(Phase::Idle) {
            tracing::info!(exam_id, "Exam session detached");
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().phase == Phase::Active
    }

    pub fn session(&self) -> Option<ExamSession> {
        self.inner.lock().session.clone()
    }

    pub fn questions(&self) -> Vec<Question> {
        self.inner.lock().questions.clone()
    }

    pub fn current_question(&self) -> Option<Question> {
        let state = self.inner.lock();
        let index = state.session.as_ref()?.current_index();
        state.questions.get(index).cloned()
    }

    pub fn remaining_seconds(&self) -> Option<u64> {
        let now = self.inner.clock.now();
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.remaining_seconds(now))
    }

    pub fn progress(&self) -> Option<Progress> {
        let state = self.inner.lock();
        let session = state.session.as_ref()?;
        let unanswered: Vec<i64> = state
            .questions
            .iter()
            .map(|q| q.id)
            .filter(|id| !session.answers().contains_key(id))
            .collect();

        Some(Progress {
            total: state.questions.len(),
            answered: state.questions.len() - unanswered.len(),
            flagged: session.flagged_question_ids().len(),
            current_index: session.current_index(),
            unanswered,
        })
    }

    pub fn submission_state(&self) -> SubmissionState {
        self.inner.coordinator.state()
    }

    /// Graded result, including the answer review, once submitted.
    pub fn result(&self) -> Option<SubmitResult> {
        self.inner.lock().result.clone()
    }

    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.inner.monitor.events()
    }

    pub fn fullscreen_prompt_pending(&self) -> bool {
        self.inner.monitor.fullscreen_prompt_pending()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.monitor.is_idle()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock();
        state.generation == generation && state.phase == Phase::Active
    }

    fn activate(self: &Arc<Self>, outcome: ResumeOutcome) -> Result<StartOutcome, SessionInitError> {
        let ResumeOutcome {
            session,
            questions,
            resumed,
        } = outcome;
        let exam_id = session.exam_id();
        let session_id = session.session_id().to_string();
        let end = session.end_time();
        let now = self.clock.now();

        let (generation, started, persisted) = {
            let mut state = self.lock();
            if state.phase != Phase::Starting {
                tracing::info!(exam_id, "Session start cancelled before activation");
                return Err(SessionInitError::Cancelled);
            }

            self.coordinator.reset();
            // Persisted immediately so a reload right after start can resume.
            let persisted = self.autosave.record_local(&session.snapshot(now));

            let started = StartOutcome {
                resumed,
                remaining_seconds: session.remaining_seconds(now),
                question_count: questions.len(),
            };
            let generation = state.generation + 1;
            *state = ManagerState {
                generation,
                phase: Phase::Active,
                session: Some(session),
                questions,
                revision: u64::from(resumed),
                ..ManagerState::default()
            };
            (state.generation, started, persisted)
        };

        if let Err(e) = persisted {
            self.notify(SessionNotice::LocalSaveFailed {
                message: e.to_string(),
            });
        }
        self.start_timers(generation, exam_id, session_id, end);
        Ok(started)
    }

    fn start_timers(self: &Arc<Self>, generation: u64, exam_id: i64, session_id: String, end: DateTime<Utc>) {
        let on_tick = {
            let weak = Arc::downgrade(self);
            move |remaining| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_tick(generation, remaining);
                }
            }
        };
        let on_expire = {
            let weak = Arc::downgrade(self);
            move || {
                if let Some(inner) = weak.upgrade() {
                    inner.on_expire(generation);
                }
            }
        };
        self.countdown.start(end, on_tick, on_expire);

        self.autosave.start_remote_loop(
            self.config.autosave_interval,
            Arc::new(RemoteProgress {
                inner: Arc::downgrade(self),
                generation,
            }),
        );

        let reporter = Arc::new(ActivityReporter {
            inner: Arc::downgrade(self),
            exam_id,
            session_id,
        });
        if let Err(e) = self.monitor.start(exam_id, self.events.as_ref(), reporter) {
            tracing::warn!(exam_id, error = %e, "Security monitoring unavailable for this session");
        }
    }

    fn stop_timers(&self) {
        self.countdown.stop();
        self.autosave.stop_remote_loop();
        self.monitor.stop();
        if let Some(handle) = self.retry.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    /// Ends the current session in memory and returns its exam id.
    fn teardown(&self, phase: Phase) -> Option<i64> {
        let exam_id = {
            let mut state = self.lock();
            state.generation += 1;
            state.phase = phase;
            state.questions.clear();
            state.result = None;
            state.session.take().map(|s| s.exam_id())
        };
        self.stop_timers();
        exam_id
    }

    fn finish(&self, generation: u64, result: &SubmitResult) {
        let exam_id = {
            let mut state = self.lock();
            if state.generation != generation {
                tracing::warn!("Submission acknowledged after the session was torn down");
                return;
            }
            state.generation += 1;
            state.phase = Phase::Submitted;
            state.result = Some(result.clone());
            state.session.take().map(|s| s.exam_id())
        };

        self.stop_timers();
        if let Some(exam_id) = exam_id {
            self.autosave.clear_local(exam_id);
        }
        self.notify(SessionNotice::Submitted {
            result: result.clone(),
        });
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut ExamSession, &[Question]) -> Result<T, ActionError>,
    ) -> Result<T, ActionError> {
        let now = self.clock.now();
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.phase != Phase::Active {
            return Err(ActionError::NoActiveSession);
        }
        if self.coordinator.state() != SubmissionState::InProgress {
            return Err(ActionError::Locked);
        }
        let session = state.session.as_mut().ok_or(ActionError::NoActiveSession)?;
        if self.countdown.has_expired() || session.remaining_seconds(now) == 0 {
            return Err(ActionError::TimeExpired);
        }

        let out = apply(session, &state.questions)?;
        state.revision += 1;
        // The change stays in memory and still reaches the server on the next
        // autosave, but the caller must not report it as durable.
        self.autosave
            .record_local(&session.snapshot(now))
            .map_err(|e| ActionError::NotPersisted(e.to_string()))?;
        Ok(out)
    }

    fn navigate(&self, target: impl FnOnce(usize, usize) -> Option<usize>) -> bool {
        let now = self.clock.now();
        let persisted = {
            let mut guard = self.lock();
            let state = &mut *guard;

            if state.phase != Phase::Active {
                return false;
            }
            let count = state.questions.len();
            let Some(session) = state.session.as_mut() else {
                return false;
            };
            let Some(index) = target(session.current_index(), count) else {
                return false;
            };
            if !controller::go_to(session, count, index) {
                return false;
            }

            state.revision += 1;
            self.autosave.record_local(&session.snapshot(now))
        };

        if let Err(e) = persisted {
            self.notify(SessionNotice::LocalSaveFailed {
                message: e.to_string(),
            });
        }
        true
    }

    fn on_tick(&self, generation: u64, remaining: u64) {
        let mut crossed = Vec::new();
        {
            let mut state = self.lock();
            if state.generation != generation || state.phase != Phase::Active {
                return;
            }
            for &threshold in &self.config.low_time_warnings {
                if remaining > 0 && remaining <= threshold && state.warned.insert(threshold) {
                    crossed.push(threshold);
                }
            }
        }

        self.notify(SessionNotice::Tick {
            remaining_seconds: remaining,
        });
        for threshold in crossed {
            self.notify(SessionNotice::LowTime {
                remaining_seconds: remaining,
                threshold,
            });
        }
    }

    fn on_expire(self: &Arc<Self>, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        tracing::info!("Time is up, submitting automatically");
        self.notify(SessionNotice::Expired);

        let manager = SessionManager {
            inner: Arc::clone(self),
        };
        tokio::spawn(async move {
            // Failures are reported and re-armed inside `submit`.
            let _ = manager.submit(SubmitTrigger::Timeout).await;
        });
    }

    /// Re-arms a timed-out submission that failed. Countdown expiry fires
    /// once, so retries are driven from here.
    fn schedule_timeout_retry(self: &Arc<Self>, generation: u64) {
        let attempt = {
            let mut state = self.lock();
            if state.generation != generation || state.phase != Phase::Active {
                return;
            }
            if state.timeout_retries >= self.config.max_timeout_retries {
                tracing::error!(
                    retries = state.timeout_retries,
                    "Giving up on automatic submission, manual submit is still possible"
                );
                return;
            }
            state.timeout_retries += 1;
            state.timeout_retries
        };

        let delay = self.config.timeout_retry_delay;
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.is_current(generation) {
                return;
            }
            tracing::info!(attempt, "Retrying timed-out submission");
            let _ = SessionManager { inner }.submit(SubmitTrigger::Timeout).await;
        });

        // The previous handle, if any, is the task running this call.
        *self.retry.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// The request for the next autosave, or `None` when there is nothing
    /// new to push or the session can no longer be saved.
    fn progress_request(&self, generation: u64) -> Option<(SaveProgressRequest, u64)> {
        let state = self.lock();
        if state.generation != generation || state.phase != Phase::Active {
            return None;
        }
        if self.coordinator.state() != SubmissionState::InProgress {
            return None;
        }
        if state.revision <= state.pushed_revision {
            return None;
        }

        let session = state.session.as_ref()?;
        Some((
            SaveProgressRequest {
                exam_id: session.exam_id(),
                session_id: session.session_id().to_string(),
                answers: session.answers().clone(),
                flagged_question_ids: session.flagged_question_ids().clone(),
                current_index: session.current_index(),
            },
            state.revision,
        ))
    }

    fn on_progress_saved(&self, generation: u64, revision: u64, acknowledged: bool, saved_at: Option<DateTime<Utc>>) {
        let at = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.generation != generation || state.phase != Phase::Active {
                tracing::debug!("Ignoring stale autosave acknowledgement");
                return;
            }
            if !acknowledged {
                tracing::warn!("Autosave not acknowledged, will retry on next tick");
                return;
            }
            let Some(session) = state.session.as_mut() else {
                return;
            };
            let at = saved_at.unwrap_or_else(|| self.clock.now());
            session.last_saved_at = Some(at);
            state.pushed_revision = state.pushed_revision.max(revision);
            at
        };
        self.notify(SessionNotice::Saved { at });
    }
}

/// Autosave sink bound to one session generation.
struct RemoteProgress {
    inner: Weak<Inner>,
    generation: u64,
}

#[async_trait]
impl ProgressSink for RemoteProgress {
    async fn push(&self) -> Result<(), AutosaveTransientError> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };
        let Some((request, revision)) = inner.progress_request(self.generation) else {
            return Ok(());
        };

        let response = inner.backend.save_progress(&request).await?;
        inner.on_progress_saved(self.generation, revision, response.acknowledged, response.saved_at);
        Ok(())
    }
}

/// Forwards security events to observers and to track-activity.
struct ActivityReporter {
    inner: Weak<Inner>,
    exam_id: i64,
    session_id: String,
}

#[async_trait]
impl SecurityReporter for ActivityReporter {
    async fn report(&self, event: &SecurityEvent) -> Result<(), SecurityReportError> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };
        inner.notify(SessionNotice::Security {
            event: event.clone(),
        });

        let request = TrackActivityRequest {
            exam_id: self.exam_id,
            session_id: self.session_id.clone(),
            event_type: event.event_type(),
            timestamp: event.timestamp(),
            details: event.details().clone(),
        };
        inner.backend.track_activity(&request).await?;
        Ok(())
    }
}
