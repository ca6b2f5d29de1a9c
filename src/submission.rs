// src/submission.rs

use std::sync::{Arc, Mutex};

use crate::backend::ExamBackend;
use crate::error::SubmissionError;
use crate::models::exam::{SubmitResult, SubmitSessionRequest, SubmitTrigger};

/// `InProgress -> Submitting -> {Submitted | InProgress}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    InProgress,
    Submitting,
    Submitted,
}

#[derive(Debug)]
struct Guarded {
    state: SubmissionState,
    attempts: u32,
    last_error: Option<String>,
}

/// Owns the submission guard. Whatever triggers a submission, at most one
/// submit-session call is in flight, and none happens after success.
pub struct SubmissionCoordinator {
    backend: Arc<dyn ExamBackend>,
    guarded: Mutex<Guarded>,
}

impl SubmissionCoordinator {
    pub fn new(backend: Arc<dyn ExamBackend>) -> Self {
        Self {
            backend,
            guarded: Mutex::new(Guarded {
                state: SubmissionState::InProgress,
                attempts: 0,
                last_error: None,
            }),
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.lock().state
    }

    /// Number of submit-session calls made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// Message of the most recent failed attempt, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Back to `InProgress` for a new session.
    pub fn reset(&self) {
        let mut guarded = self.lock();
        guarded.state = SubmissionState::InProgress;
        guarded.attempts = 0;
        guarded.last_error = None;
    }

    /// Guards and sends one submission.
    pub async fn submit(
        &self,
        trigger: SubmitTrigger,
        request: SubmitSessionRequest,
    ) -> Result<SubmitResult, SubmissionError> {
        self.begin(request.exam_id, trigger)?;
        self.send(trigger, request).await
    }

    /// Takes the guard: `InProgress -> Submitting`. Synchronous, so a caller
    /// can take it in the same critical section that snapshots the answers.
    pub fn begin(&self, exam_id: i64, trigger: SubmitTrigger) -> Result<(), SubmissionError> {
        let mut guarded = self.lock();
        match guarded.state {
            SubmissionState::Submitting => {
                tracing::info!(exam_id, %trigger, "Submission already in progress");
                Err(SubmissionError::AlreadyInProgress)
            }
            SubmissionState::Submitted => {
                tracing::info!(exam_id, %trigger, "Exam already submitted");
                Err(SubmissionError::AlreadySubmitted)
            }
            SubmissionState::InProgress => {
                guarded.state = SubmissionState::Submitting;
                guarded.attempts += 1;
                Ok(())
            }
        }
    }

    /// Performs the call for a guard taken with [`begin`](Self::begin) and
    /// settles the state from its outcome.
    pub async fn send(
        &self,
        trigger: SubmitTrigger,
        request: SubmitSessionRequest,
    ) -> Result<SubmitResult, SubmissionError> {
        tracing::info!(
            exam_id = request.exam_id,
            session_id = %request.session_id,
            %trigger,
            answered = request.answers.len(),
            "Submitting exam"
        );

        let outcome = self.backend.submit_session(&request).await;

        let mut guarded = self.lock();
        match outcome {
            Ok(result) => {
                guarded.state = SubmissionState::Submitted;
                guarded.last_error = None;
                tracing::info!(exam_id = request.exam_id, score = result.score, "Exam submitted");
                Ok(result)
            }
            Err(e) => {
                guarded.state = SubmissionState::InProgress;
                guarded.last_error = Some(e.to_string());
                tracing::error!(exam_id = request.exam_id, %trigger, error = %e, "Submission failed");
                Err(SubmissionError::Network(e))
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Guarded> {
        self.guarded.lock().unwrap_or_else(|e| e.into_inner())
    }
}
