// src/models/exam.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    question::{Question, QuestionReview},
    security_event::SecurityEventType,
};

/// Upper bound on a server-issued exam duration: one year.
pub const MAX_DURATION_SECONDS: u64 = 365 * 24 * 60 * 60;

/// DTO returned by start-session. The server's clock anchor is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartSessionResponse {
    /// Server-issued identity of this attempt.
    #[validate(length(min = 1, max = 256))]
    pub session_id: String,

    /// True when the server is continuing an attempt that was already active.
    #[serde(default)]
    pub resumed: bool,

    pub start_time: DateTime<Utc>,

    #[validate(range(min = 1, max = MAX_DURATION_SECONDS))]
    pub duration_seconds: u64,

    #[validate(length(min = 1), custom(function = validate_unique_ids))]
    pub questions: Vec<Question>,

    /// Progress the server already holds for a resumed attempt.
    #[serde(default)]
    pub answers: HashMap<i64, String>,

    #[serde(default)]
    pub current_index: Option<usize>,
}

fn validate_unique_ids(questions: &[Question]) -> Result<(), validator::ValidationError> {
    let mut seen = HashSet::new();
    for q in questions {
        if !seen.insert(q.id) {
            return Err(validator::ValidationError::new("duplicate_question_id"));
        }
    }
    Ok(())
}

/// DTO for save-progress. Advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveProgressRequest {
    pub exam_id: i64,
    pub session_id: String,
    pub answers: HashMap<i64, String>,
    #[serde(default)]
    pub flagged_question_ids: BTreeSet<i64>,
    pub current_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveProgressResponse {
    pub acknowledged: bool,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

/// What caused a submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    Timeout,
}

impl std::fmt::Display for SubmitTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitTrigger::Manual => f.write_str("manual"),
            SubmitTrigger::Timeout => f.write_str("timeout"),
        }
    }
}

/// DTO for the terminal submit-session call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitSessionRequest {
    pub exam_id: i64,
    pub session_id: String,
    /// Key: Question ID, Value: selected option.
    pub answers: HashMap<i64, String>,
    pub trigger: SubmitTrigger,
}

/// Graded outcome of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub score: f64,
    pub correct_count: usize,
    pub total_questions: usize,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub message: String,
    /// Correct answers and explanations, only available once submitted.
    #[serde(default)]
    pub review: Vec<QuestionReview>,
}

/// DTO for track-activity. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackActivityRequest {
    pub exam_id: i64,
    pub session_id: String,
    pub event_type: SecurityEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}
