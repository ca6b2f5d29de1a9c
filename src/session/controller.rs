// src/session/controller.rs

//! Synchronous mutations of an in-memory session. Persisting the result is
//! the caller's job.

use crate::error::ActionError;
use crate::models::{question::Question, session::ExamSession};

/// Moves to `index`. Out-of-range requests leave the session untouched and
/// return false.
pub fn go_to(session: &mut ExamSession, question_count: usize, index: usize) -> bool {
    if index >= question_count {
        return false;
    }
    session.current_index = index;
    true
}

/// Records `option` for `question_id`, replacing any earlier answer.
pub fn set_answer(
    session: &mut ExamSession,
    questions: &[Question],
    question_id: i64,
    option: &str,
) -> Result<(), ActionError> {
    let question = find(questions, question_id)?;
    if !question.offers(option) {
        return Err(ActionError::InvalidOption {
            question_id,
            option: option.to_string(),
        });
    }
    session.answers.insert(question_id, option.to_string());
    Ok(())
}

/// Removes the answer for `question_id`, if any.
pub fn clear_answer(
    session: &mut ExamSession,
    questions: &[Question],
    question_id: i64,
) -> Result<bool, ActionError> {
    find(questions, question_id)?;
    Ok(session.answers.remove(&question_id).is_some())
}

/// Flips the flag on `question_id` and returns whether it is now flagged.
pub fn toggle_flag(
    session: &mut ExamSession,
    questions: &[Question],
    question_id: i64,
) -> Result<bool, ActionError> {
    find(questions, question_id)?;
    if session.flagged_question_ids.remove(&question_id) {
        Ok(false)
    } else {
        session.flagged_question_ids.insert(question_id);
        Ok(true)
    }
}

fn find(questions: &[Question], question_id: i64) -> Result<&Question, ActionError> {
    questions
        .iter()
        .find(|q| q.id == question_id)
        .ok_or(ActionError::UnknownQuestion(question_id))
}
