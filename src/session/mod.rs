// src/session/mod.rs

use chrono::{DateTime, Utc};

use crate::models::{
    exam::{SubmitResult, SubmitTrigger},
    security_event::SecurityEvent,
};

pub mod controller;
pub mod manager;

pub use manager::{SessionManager, StartOutcome};

/// Broadcast to observers of a running session.
#[derive(Debug, Clone)]
pub enum SessionNotice {
    Tick { remaining_seconds: u64 },
    LowTime { remaining_seconds: u64, threshold: u64 },
    Expired,
    Saved { at: DateTime<Utc> },
    /// The local snapshot could not be written; progress lives in memory only.
    LocalSaveFailed { message: String },
    Submitted { result: SubmitResult },
    SubmissionFailed { trigger: SubmitTrigger, message: String },
    Security { event: SecurityEvent },
}

/// Answer coverage, for a pre-submit review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub answered: usize,
    pub flagged: usize,
    pub current_index: usize,
    /// Question ids without an answer, in paper order.
    pub unanswered: Vec<i64>,
}
