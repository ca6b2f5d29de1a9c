// src/models/session.rs

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::countdown::remaining_seconds;

/// Authoritative client-side state of one exam attempt.
///
/// The clock anchor (`start_time`, `duration_seconds`) and identity are fixed
/// at construction; only answers, flags and position change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamSession {
    exam_id: i64,
    session_id: String,
    start_time: DateTime<Utc>,
    duration_seconds: u64,
    pub(crate) answers: HashMap<i64, String>,
    pub(crate) flagged_question_ids: BTreeSet<i64>,
    pub(crate) current_index: usize,
    pub(crate) last_saved_at: Option<DateTime<Utc>>,
}

impl ExamSession {
    pub fn new(
        exam_id: i64,
        session_id: String,
        start_time: DateTime<Utc>,
        duration_seconds: u64,
    ) -> Self {
        Self {
            exam_id,
            session_id,
            start_time,
            duration_seconds,
            answers: HashMap::new(),
            flagged_question_ids: BTreeSet::new(),
            current_index: 0,
            last_saved_at: None,
        }
    }

    pub fn exam_id(&self) -> i64 {
        self.exam_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Saturates at the latest representable instant for absurd durations.
    pub fn end_time(&self) -> DateTime<Utc> {
        i64::try_from(self.duration_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|span| self.start_time.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// `max(0, duration - (now - start))`, always derived from the absolutes.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        remaining_seconds(self.end_time(), now)
    }

    pub fn answers(&self) -> &HashMap<i64, String> {
        &self.answers
    }

    pub fn flagged_question_ids(&self) -> &BTreeSet<i64> {
        &self.flagged_question_ids
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Time of the last acknowledged remote save. Advisory.
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            exam_id: self.exam_id,
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            duration_seconds: self.duration_seconds,
            answers: self.answers.clone(),
            flagged_question_ids: self.flagged_question_ids.clone(),
            current_index: self.current_index,
            saved_at,
        }
    }
}

/// The locally persisted record for one exam, keyed by `exam_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub exam_id: i64,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: u64,
    #[serde(default)]
    pub answers: HashMap<i64, String>,
    #[serde(default)]
    pub flagged_question_ids: BTreeSet<i64>,
    #[serde(default)]
    pub current_index: usize,
    pub saved_at: DateTime<Utc>,
}
