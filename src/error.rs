// src/error.rs

use thiserror::Error;

/// Errors returned by an [`ExamBackend`](crate::backend::ExamBackend).
///
/// Non-2xx responses carry the server's `{"error": "..."}` message when present.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("backend returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("backend unreachable: {0}")]
    Transport(String),

    #[error("malformed backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Errors from a [`KeyValueStore`](crate::store::KeyValueStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventSourceError {
    #[error("event source already has an active subscription")]
    AlreadySubscribed,
}

/// Fatal: the exam cannot begin without a server-confirmed clock anchor.
#[derive(Debug, Error)]
pub enum SessionInitError {
    #[error("could not start exam session: {0}")]
    Backend(#[from] BackendError),

    #[error("server returned an unusable session: {0}")]
    InvalidSession(String),

    #[error("a session for exam {0} is already running")]
    AlreadyRunning(i64),

    #[error("session start was cancelled")]
    Cancelled,
}

/// Recovered locally; the next autosave tick retries.
#[derive(Debug, Error)]
pub enum AutosaveTransientError {
    #[error("remote progress save failed: {0}")]
    Remote(#[from] BackendError),
}

/// Ignored apart from logging.
#[derive(Debug, Error)]
pub enum SecurityReportError {
    #[error("activity report failed: {0}")]
    Remote(#[from] BackendError),
}

/// Submission outcome errors. Only `Network` releases the submission guard.
#[derive(Debug, Clone, Error)]
pub enum SubmissionError {
    #[error("submission already in progress")]
    AlreadyInProgress,

    #[error("exam has already been submitted")]
    AlreadySubmitted,

    #[error("no active exam session")]
    NoActiveSession,

    #[error("submission failed, your answers are kept: {0}")]
    Network(#[from] BackendError),
}

/// A user action (answer, flag) the session refused to apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("no active exam session")]
    NoActiveSession,

    #[error("session is locked for submission")]
    Locked,

    #[error("time is up")]
    TimeExpired,

    #[error("question {0} is not part of this exam")]
    UnknownQuestion(i64),

    #[error("option {option:?} is not offered by question {question_id}")]
    InvalidOption { question_id: i64, option: String },

    /// Applied in memory, but the local snapshot could not be written.
    #[error("change kept in memory but not saved locally: {0}")]
    NotPersisted(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}
