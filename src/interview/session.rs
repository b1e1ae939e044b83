use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::Decision;
use super::profile::ApplicantProfile;
use super::prompts::build_persona_prompt;
use super::questions::{fallback_question, MAX_QUESTIONS};
use crate::error::InterviewError;
use crate::speech::{ListenTag, RecognitionState};
use crate::transcription_buffer::{TranscriptionBuffer, TranscriptionStats};

/// One answered question. Only ever built with both halves present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub number: u32,
    pub question: String,
    pub answer: String,
    /// The question came from the fallback pool, not the completion service.
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    WaitingToStart,
    AskingQuestion,
    Listening,
    Submitting,
    AwaitingRetry,
    Complete,
}

impl Phase {
    /// The transition table of the turn controller. A fallback question is
    /// asked from `Submitting`, after the retried submission fails again.
    pub fn can_move_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (WaitingToStart, AskingQuestion)
                | (AskingQuestion, Listening)
                | (Listening, Listening)
                | (Listening, Submitting)
                | (Submitting, AskingQuestion)
                | (Submitting, AwaitingRetry)
                | (Submitting, Complete)
                | (AwaitingRetry, Submitting)
        )
    }
}

/// The answer currently in flight, kept until a question (or verdict) has
/// been obtained for it so a retry resends exactly the same text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    pub text: String,
    /// Failed completion attempts for this answer.
    pub failures: u8,
}

/// State of one mock interview. Owned by the caller and handed to every
/// controller operation; nothing about a session lives anywhere else.
#[derive(Debug)]
pub struct InterviewSession {
    id: Uuid,
    user_key: String,
    profile: ApplicantProfile,
    system_prompt: String,
    phase: Phase,
    turns: Vec<Turn>,
    open_question: Option<String>,
    open_from_fallback: bool,
    transcript: TranscriptionBuffer,
    listen_tag: ListenTag,
    recognition: RecognitionState,
    recognition_ended: bool,
    pending: Option<PendingAnswer>,
    fallback_cursor: usize,
    last_error: Option<InterviewError>,
    decision: Option<Decision>,
    status: String,
    review_submitted: bool,
    started_at: DateTime<Utc>,
}

impl InterviewSession {
    pub fn new(user_key: impl Into<String>, profile: ApplicantProfile) -> Self {
        let system_prompt = build_persona_prompt(&profile);
        Self {
            id: Uuid::new_v4(),
            user_key: user_key.into(),
            profile,
            system_prompt,
            phase: Phase::WaitingToStart,
            turns: Vec::new(),
            open_question: None,
            open_from_fallback: false,
            transcript: TranscriptionBuffer::new(),
            listen_tag: ListenTag::default(),
            recognition: RecognitionState::Idle,
            recognition_ended: false,
            pending: None,
            fallback_cursor: 0,
            last_error: None,
            decision: None,
            status: "Waiting to start...".to_string(),
            review_submitted: false,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    pub fn profile(&self) -> &ApplicantProfile {
        &self.profile
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// 1-based number of the question currently on the floor.
    pub fn turn_index(&self) -> u32 {
        self.turns.len() as u32 + 1
    }

    pub fn open_question(&self) -> Option<&str> {
        self.open_question.as_deref()
    }

    pub fn transcript(&self) -> &str {
        self.transcript.retained()
    }

    pub fn transcript_stats(&self) -> TranscriptionStats {
        self.transcript.get_stats()
    }

    pub fn listen_tag(&self) -> ListenTag {
        self.listen_tag
    }

    pub fn recognition(&self) -> RecognitionState {
        self.recognition
    }

    pub fn recognition_ended(&self) -> bool {
        self.recognition_ended
    }

    pub fn pending(&self) -> Option<&PendingAnswer> {
        self.pending.as_ref()
    }

    pub fn last_error(&self) -> Option<&InterviewError> {
        self.last_error.as_ref()
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn review_submitted(&self) -> bool {
        self.review_submitted
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the pending answer closes the interview.
    pub fn is_final_answer(&self) -> bool {
        self.turns.len() + 1 >= MAX_QUESTIONS
    }

    pub(crate) fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub(crate) fn set_phase(&mut self, next: Phase) {
        if !self.phase.can_move_to(next) {
            warn!("Unexpected phase change {:?} -> {:?} in session {}", self.phase, next, self.id);
            debug_assert!(false, "illegal phase change {:?} -> {:?}", self.phase, next);
        }
        self.phase = next;
    }

    pub(crate) fn record_error(&mut self, error: InterviewError) {
        self.status = error.status_message();
        self.last_error = Some(error);
    }

    /// Puts a new question on the floor and forgets everything heard for the
    /// previous one.
    pub(crate) fn issue_question(&mut self, question: String, fallback: bool) {
        self.set_phase(Phase::AskingQuestion);
        info!("❓ Question #{} for session {}: {}", self.turn_index(), self.id, question);
        self.open_question = Some(question);
        self.open_from_fallback = fallback;
        self.transcript.clear();
        self.recognition = RecognitionState::Idle;
        self.recognition_ended = false;
        self.last_error = None;
        self.status = "AI is speaking...".to_string();
    }

    /// Starts a new listening run and returns its tag. The transcript is kept
    /// so a restarted run only replaces it with something longer.
    pub(crate) fn begin_listening(&mut self) -> ListenTag {
        self.set_phase(Phase::Listening);
        self.listen_tag = self.listen_tag.next();
        self.recognition = RecognitionState::Listening;
        self.recognition_ended = false;
        self.status = "Listening...".to_string();
        self.listen_tag
    }

    pub(crate) fn offer_transcript(&mut self, text: &str) -> bool {
        self.transcript.offer(text)
    }

    pub(crate) fn answer_from_transcript(&self) -> Option<String> {
        self.transcript.answer()
    }

    pub(crate) fn set_recognition(&mut self, state: RecognitionState) {
        self.recognition = state;
    }

    pub(crate) fn mark_recognition_ended(&mut self) {
        self.recognition_ended = true;
    }

    pub(crate) fn begin_submission(&mut self, answer: String) {
        self.set_phase(Phase::Submitting);
        self.pending = Some(PendingAnswer { text: answer, failures: 0 });
        self.status = "Processing...".to_string();
    }

    pub(crate) fn resume_submission(&mut self) {
        self.set_phase(Phase::Submitting);
        self.last_error = None;
        self.status = "Retrying last answer...".to_string();
    }

    /// Counts a failed attempt for the pending answer; returns the total.
    pub(crate) fn note_failure(&mut self, error: InterviewError) -> u8 {
        self.record_error(error);
        match self.pending.as_mut() {
            Some(pending) => {
                pending.failures += 1;
                pending.failures
            }
            None => 0,
        }
    }

    pub(crate) fn await_retry(&mut self) {
        self.set_phase(Phase::AwaitingRetry);
    }

    /// Records the open question with its pending answer as a turn. A no-op
    /// when there is nothing pending, so a turn can never be added twice.
    pub(crate) fn commit_turn(&mut self) {
        let (Some(pending), Some(question)) = (self.pending.take(), self.open_question.take()) else {
            return;
        };
        if self.turns.len() >= MAX_QUESTIONS {
            warn!("Session {} already holds {} turns, dropping answer", self.id, MAX_QUESTIONS);
            return;
        }
        self.turns.push(Turn {
            number: self.turns.len() as u32 + 1,
            question,
            answer: pending.text,
            fallback: self.open_from_fallback,
        });
    }

    pub(crate) fn next_fallback(&mut self) -> String {
        let question = fallback_question(self.fallback_cursor).to_string();
        self.fallback_cursor += 1;
        question
    }

    pub(crate) fn complete(&mut self, decision: Decision) {
        self.set_phase(Phase::Complete);
        self.decision = Some(decision);
        self.recognition = RecognitionState::Idle;
        self.status = "Interview Complete".to_string();
    }

    pub(crate) fn mark_reviewed(&mut self) {
        self.review_submitted = true;
    }
}
