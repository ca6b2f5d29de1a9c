// src/resume.rs

use std::collections::HashSet;
use std::sync::Arc;

use validator::Validate;

use crate::backend::ExamBackend;
use crate::error::SessionInitError;
use crate::models::{
    exam::StartSessionResponse,
    question::Question,
    session::{ExamSession, SessionSnapshot},
};
use crate::store::SnapshotStore;

/// Result of reconciling local state with the server.
#[derive(Debug, Clone)]
pub struct ResumeOutcome {
    pub session: ExamSession,
    pub questions: Vec<Question>,
    /// True when a local snapshot was carried over.
    pub resumed: bool,
}

/// Decides between resuming a locally persisted attempt and starting fresh.
///
/// The server is always asked first: its clock anchor wins over anything
/// stored locally, and a candidate snapshot is only kept when the server
/// confirms the very same attempt is still active.
pub struct SessionResumer {
    backend: Arc<dyn ExamBackend>,
    store: SnapshotStore,
}

impl SessionResumer {
    pub fn new(backend: Arc<dyn ExamBackend>, store: SnapshotStore) -> Self {
        Self { backend, store }
    }

    pub async fn resume(&self, exam_id: i64) -> Result<ResumeOutcome, SessionInitError> {
        let candidate = match self.store.load(exam_id) {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(exam_id, error = %e, "Could not read local snapshot, starting fresh");
                None
            }
        };

        let response = self.backend.start_session(exam_id).await.map_err(|e| {
            tracing::error!(exam_id, error = %e, "Start-session request failed");
            SessionInitError::from(e)
        })?;

        response.validate().map_err(|e| {
            tracing::error!(exam_id, error = %e, "Start-session response rejected");
            SessionInitError::InvalidSession(e.to_string())
        })?;

        let outcome = reconcile(exam_id, candidate, response);
        if !outcome.resumed {
            // Anything stored belongs to a finished or foreign attempt.
            if let Err(e) = self.store.clear(exam_id) {
                tracing::warn!(exam_id, error = %e, "Failed to discard stale snapshot");
            }
        }

        tracing::info!(
            exam_id,
            session_id = outcome.session.session_id(),
            resumed = outcome.resumed,
            answered = outcome.session.answers().len(),
            "Exam session initialised"
        );
        Ok(outcome)
    }
}

/// Merges a candidate snapshot onto the server's session.
///
/// * Server time always wins.
/// * Local answers win over the server's unless the local set is empty.
/// * Anything that does not fit the server's question set is dropped.
pub fn reconcile(
    exam_id: i64,
    candidate: Option<SessionSnapshot>,
    response: StartSessionResponse,
) -> ResumeOutcome {
    let mut session = ExamSession::new(
        exam_id,
        response.session_id.clone(),
        response.start_time,
        response.duration_seconds,
    );
    let known: HashSet<i64> = response.questions.iter().map(|q| q.id).collect();
    let last_index = response.questions.len().saturating_sub(1);

    let matching = candidate.filter(|snapshot| {
        let same = response.resumed && snapshot.session_id == response.session_id;
        if !same {
            tracing::info!(
                exam_id,
                local = %snapshot.session_id,
                server = %response.session_id,
                server_resumed = response.resumed,
                "Discarding local snapshot for a different attempt"
            );
        }
        same
    });

    let resumed = matching.is_some();
    match matching {
        Some(snapshot) => {
            session.answers = if snapshot.answers.is_empty() {
                response.answers
            } else {
                snapshot.answers
            };
            session.flagged_question_ids = snapshot.flagged_question_ids;
            session.current_index = snapshot.current_index;
        }
        None if response.resumed => {
            session.answers = response.answers;
            session.current_index = response.current_index.unwrap_or(0);
        }
        None => {}
    }

    session.answers.retain(|id, _| known.contains(id));
    session.flagged_question_ids.retain(|id| known.contains(id));
    session.current_index = session.current_index.min(last_index);

    ResumeOutcome {
        session,
        questions: response.questions,
        resumed,
    }
}
