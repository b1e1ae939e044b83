use crate::error::InterviewError;

/// Answered turns after which the session is decided.
pub const MAX_QUESTIONS: usize = 6;

/// A generated question must be longer than this (in characters).
pub const MIN_QUESTION_LEN: usize = 10;

/// Completion attempts per answer: the first try plus one retry.
pub const MAX_SUBMISSION_ATTEMPTS: u8 = 2;

/// Asked, in order and cycling, when the completion service cannot produce a
/// usable question twice in a row.
pub const FALLBACK_QUESTIONS: [&str; 5] = [
    "What are your plans after completing your studies?",
    "How will you fund your education in the US?",
    "Why did you choose this university?",
    "What ties do you have to your home country?",
    "What is your field of study and why did you choose it?",
];

pub fn fallback_question(cursor: usize) -> &'static str {
    FALLBACK_QUESTIONS[cursor % FALLBACK_QUESTIONS.len()]
}

/// Pulls the next question out of a completion reply.
///
/// Only the first line counts. It has to end with `?`, be longer than
/// [`MIN_QUESTION_LEN`] and differ from the question just asked; otherwise
/// the whole reply comes back inside the error.
pub fn validate_reply(reply: &str, previous_question: &str) -> Result<String, InterviewError> {
    let first_line = reply.lines().next().unwrap_or("").trim();

    let is_question = first_line.ends_with('?') && first_line.chars().count() > MIN_QUESTION_LEN;
    if !is_question || first_line == previous_question.trim() {
        return Err(InterviewError::InvalidCompletionReply {
            reply: reply.to_string(),
        });
    }

    Ok(first_line.to_string())
}
