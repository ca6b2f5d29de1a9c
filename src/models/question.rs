// src/models/question.rs

use serde::{Deserialize, Serialize};

/// A question as delivered to the candidate at session start.
///
/// The correct answer is never part of client state; it only comes back
/// inside a [`QuestionReview`] after submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// 'single' or 'multiple'.
    #[serde(rename = "type", default = "default_question_type")]
    pub question_type: String,

    pub content: String,

    /// Offered options, in display order.
    pub options: Vec<String>,
}

fn default_question_type() -> String {
    "single".to_string()
}

impl Question {
    pub fn offers(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// Post-submission feedback for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionReview {
    pub question_id: i64,
    pub correct_answer: String,
    #[serde(default)]
    pub your_answer: Option<String>,
    /// Explanation or analysis of the correct answer.
    #[serde(default)]
    pub explanation: Option<String>,
}
