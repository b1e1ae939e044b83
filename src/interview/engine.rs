use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};

use super::decision::{extract_decision, Decision};
use super::entitlement::check_entitlement;
use super::prompts::{build_conversation, build_decision_conversation, opening_question};
use super::questions::{validate_reply, MAX_SUBMISSION_ATTEMPTS};
use super::session::{InterviewSession, Phase};
use crate::completion::CompletionService;
use crate::database::{
    get_or_create, InterviewLogEntry, PaymentStatus, RecordStore, RecordUpdate, ReviewEntry, StoreError,
    UserAttemptRecord, INTERVIEW_LOGS, VOICE_REVIEWS,
};
use crate::error::InterviewError;
use crate::speech::{RecognitionState, SpeechEvent, SpeechEventKind, SpeechEventSender, SpeechService};

/// What a controller operation did, for whoever renders the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    QuestionIssued { number: u32, question: String, fallback: bool },
    TranscriptUpdated(String),
    Listening,
    /// The engine stopped on its own with nothing heard.
    RecognitionEnded,
    NothingToSubmit,
    AwaitingRetry(InterviewError),
    RecognitionFailed(InterviewError),
    Blocked(InterviewError),
    Completed(Decision),
    /// Stale event or an operation that does not apply in the current phase.
    Ignored,
}

/// Drives one [`InterviewSession`] through its turns.
///
/// Holds only the capabilities; all per-interview state lives in the session
/// passed to each call, and every call runs to completion before the next
/// one is made.
pub struct InterviewController {
    speech: Arc<dyn SpeechService>,
    completion: Arc<dyn CompletionService>,
    store: Arc<dyn RecordStore>,
    speech_events: SpeechEventSender,
}

impl InterviewController {
    pub fn new(
        speech: Arc<dyn SpeechService>,
        completion: Arc<dyn CompletionService>,
        store: Arc<dyn RecordStore>,
        speech_events: SpeechEventSender,
    ) -> Self {
        Self {
            speech,
            completion,
            store,
            speech_events,
        }
    }

    /// Checks the user's entitlement and asks the opening question.
    pub async fn start(&self, session: &mut InterviewSession) -> Outcome {
        if session.phase() != Phase::WaitingToStart {
            return Outcome::Ignored;
        }

        let record = match get_or_create(self.store.as_ref(), session.user_key()).await {
            Ok(record) => record,
            Err(e) => {
                error!("❌ Could not load attempt record for {}: {}", session.user_key(), e);
                return block(session, e.into());
            }
        };
        if let Err(e) = check_entitlement(&record) {
            info!("⛔ Interview not started for {}: {}", session.user_key(), e);
            return block(session, e);
        }

        self.log_start(session, &record).await;

        info!(
            "🚀 Starting interview {} for {} (attempt {})",
            session.id(),
            session.user_key(),
            record.mock_attempts + 1
        );
        let question = opening_question(session.profile());
        self.ask(session, question, false).await
    }

    /// Applies one event from the recognition engine. Events from a previous
    /// listening run, or arriving outside of `Listening`, are dropped.
    pub async fn handle_speech_event(&self, session: &mut InterviewSession, event: SpeechEvent) -> Outcome {
        if event.tag != session.listen_tag() || session.phase() != Phase::Listening {
            debug!("Dropping stale speech event {:?} (phase {:?})", event, session.phase());
            return Outcome::Ignored;
        }

        match event.kind {
            SpeechEventKind::Transcript { text, .. } => {
                if session.offer_transcript(&text) {
                    Outcome::TranscriptUpdated(session.transcript().to_string())
                } else {
                    Outcome::Ignored
                }
            }
            SpeechEventKind::StateChanged(RecognitionState::Idle) => {
                if session.recognition() != RecognitionState::Error {
                    if let Some(answer) = session.answer_from_transcript() {
                        info!("🎤 Recognition ended, submitting answer");
                        return self.submit_answer(session, answer).await;
                    }
                    session.set_recognition(RecognitionState::Idle);
                }
                session.mark_recognition_ended();
                Outcome::RecognitionEnded
            }
            SpeechEventKind::StateChanged(state) => {
                session.set_recognition(state);
                if state == RecognitionState::Listening {
                    Outcome::Listening
                } else {
                    Outcome::Ignored
                }
            }
            SpeechEventKind::Failed(reason) => {
                warn!("🎤 Recognition error: {}", reason);
                session.set_recognition(RecognitionState::Error);
                let err = InterviewError::RecognitionFailure(reason);
                session.record_error(err.clone());
                Outcome::RecognitionFailed(err)
            }
        }
    }

    /// Submits what has been heard so far for the open question.
    pub async fn submit(&self, session: &mut InterviewSession) -> Outcome {
        if session.phase() != Phase::Listening {
            return Outcome::Ignored;
        }
        match session.answer_from_transcript() {
            Some(answer) => self.submit_answer(session, answer).await,
            None => {
                session.set_status("Please answer the question before submitting.");
                Outcome::NothingToSubmit
            }
        }
    }

    /// Resends the answer whose submission just failed.
    pub async fn retry(&self, session: &mut InterviewSession) -> Outcome {
        if session.phase() != Phase::AwaitingRetry {
            return Outcome::Ignored;
        }
        info!("🔁 Retrying answer for question #{}", session.turn_index());
        session.resume_submission();
        self.resolve_pending(session).await
    }

    /// Starts a fresh listening run for the open question, keeping what was
    /// heard so far.
    pub async fn restart_listening(&self, session: &mut InterviewSession) -> Outcome {
        if session.phase() != Phase::Listening {
            return Outcome::Ignored;
        }
        self.speech.stop_listening().await;
        match self.listen(session).await {
            Ok(()) => Outcome::Listening,
            Err(e) => Outcome::RecognitionFailed(e),
        }
    }

    /// Stops recognition for a session that is being torn down. Whatever was
    /// in flight is simply not applied.
    pub async fn abandon(&self, session: &mut InterviewSession) {
        info!("🛑 Abandoning interview {} in phase {:?}", session.id(), session.phase());
        self.speech.stop_listening().await;
    }

    /// Stores the applicant's review of a finished interview. One per session.
    pub async fn submit_review(
        &self,
        session: &mut InterviewSession,
        text: &str,
        rating: u8,
    ) -> Result<(), InterviewError> {
        if !session.is_complete() {
            return Err(InterviewError::InvalidReview("the interview is not finished".to_string()));
        }
        if session.review_submitted() {
            return Err(InterviewError::InvalidReview("a review was already submitted".to_string()));
        }
        if !(1..=5).contains(&rating) {
            return Err(InterviewError::InvalidReview(format!("rating {} is not between 1 and 5", rating)));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(InterviewError::InvalidReview("the review is empty".to_string()));
        }

        let entry = ReviewEntry {
            email: session.user_key().to_string(),
            review: text.to_string(),
            rating,
            result: session.decision().map(|d| d.verdict.clone()).unwrap_or_default(),
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&entry).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.append_log(VOICE_REVIEWS, value).await?;

        session.mark_reviewed();
        info!("⭐ Review ({}/5) stored for {}", rating, session.user_key());
        Ok(())
    }

    async fn log_start(&self, session: &InterviewSession, record: &UserAttemptRecord) {
        let entry = InterviewLogEntry {
            email: session.user_key().to_string(),
            attempt_number: record.mock_attempts + 1,
            session_id: session.id().to_string(),
            timestamp: session.started_at(),
        };
        let result = match serde_json::to_value(&entry) {
            Ok(value) => self.store.append_log(INTERVIEW_LOGS, value).await,
            Err(e) => Err(StoreError::Serialization(e.to_string())),
        };
        if let Err(e) = result {
            warn!("⚠️ Failed to log interview start for {}: {}", session.user_key(), e);
        }
    }

    async fn ask(&self, session: &mut InterviewSession, question: String, fallback: bool) -> Outcome {
        session.issue_question(question.clone(), fallback);
        if let Err(e) = self.speech.speak(&question).await {
            warn!("🔇 Could not speak question, continuing: {}", e);
        }
        if let Err(e) = self.listen(session).await {
            warn!("🎤 Listening did not start for question #{}: {}", session.turn_index(), e);
        }
        Outcome::QuestionIssued {
            number: session.turn_index(),
            question,
            fallback,
        }
    }

    async fn listen(&self, session: &mut InterviewSession) -> Result<(), InterviewError> {
        let tag = session.begin_listening();
        if let Err(e) = self.speech.start_listening(tag, self.speech_events.clone()).await {
            session.set_recognition(RecognitionState::Error);
            let err = InterviewError::RecognitionFailure(e.to_string());
            session.record_error(err.clone());
            return Err(err);
        }
        debug!("Listening run {:?} started", tag);
        Ok(())
    }

    async fn submit_answer(&self, session: &mut InterviewSession, answer: String) -> Outcome {
        self.speech.stop_listening().await;
        let stats = session.transcript_stats();
        debug!(
            "Transcript kept {} chars after {} updates ({} shorter candidates dropped)",
            stats.retained_chars, stats.updates, stats.discarded
        );
        info!("📝 Answer for question #{}: {}", session.turn_index(), preview(&answer));
        session.begin_submission(answer);
        self.resolve_pending(session).await
    }

    /// Obtains the next question (or the verdict) for the pending answer.
    async fn resolve_pending(&self, session: &mut InterviewSession) -> Outcome {
        let Some(pending) = session.pending().cloned() else {
            return Outcome::Ignored;
        };
        let question = session.open_question().unwrap_or_default().to_string();

        if session.is_final_answer() {
            return self.conclude(session, &question, &pending.text).await;
        }

        let messages = build_conversation(session.system_prompt(), session.turns(), &question, &pending.text);
        let next = match self.completion.complete(&messages).await {
            Ok(reply) => validate_reply(&reply, &question),
            Err(e) => Err(InterviewError::CompletionServiceFailure(e.to_string())),
        };

        match next {
            Ok(next_question) => {
                session.commit_turn();
                self.ask(session, next_question, false).await
            }
            Err(err) => self.submission_failed(session, err).await,
        }
    }

    async fn submission_failed(&self, session: &mut InterviewSession, err: InterviewError) -> Outcome {
        warn!("⚠️ Submission for question #{} failed: {}", session.turn_index(), preview(&err.to_string()));
        if session.note_failure(err.clone()) < MAX_SUBMISSION_ATTEMPTS {
            session.await_retry();
            return Outcome::AwaitingRetry(err);
        }

        session.commit_turn();
        let question = session.next_fallback();
        session.set_status("Using fallback question.");
        info!("🔄 Using fallback question: {}", question);
        self.ask(session, question, true).await
    }

    async fn conclude(&self, session: &mut InterviewSession, question: &str, answer: &str) -> Outcome {
        info!("⚖️ Final answer received, requesting decision");
        let messages = build_decision_conversation(session.profile(), session.turns(), question, answer);

        let decision = match self.completion.complete(&messages).await {
            Ok(reply) => extract_decision(&reply),
            Err(e) => {
                let err = InterviewError::CompletionServiceFailure(e.to_string());
                warn!("⚠️ Decision request failed: {}", err);
                if session.note_failure(err.clone()) < MAX_SUBMISSION_ATTEMPTS {
                    session.await_retry();
                    return Outcome::AwaitingRetry(err);
                }
                Decision::conservative_default()
            }
        };

        session.commit_turn();
        session.complete(decision.clone());
        info!("✅ Interview {} complete: {}", session.id(), decision.verdict);

        self.record_completion(session).await;
        if let Err(e) = self.speech.speak(&decision.verdict).await {
            warn!("🔇 Could not speak decision: {}", e);
        }
        Outcome::Completed(decision)
    }

    /// Counts the finished interview against the user's free attempts.
    /// Approved users are never counted. Failures are logged and swallowed.
    async fn record_completion(&self, session: &InterviewSession) {
        let user_key = session.user_key();
        let record = match self.store.get(user_key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("⚠️ Attempt record for {} vanished, not counting interview", user_key);
                return;
            }
            Err(e) => {
                warn!("⚠️ Could not read attempt record for {}: {}", user_key, e);
                return;
            }
        };
        if record.payment_status == PaymentStatus::Approved {
            debug!("{} is approved, attempt not counted", user_key);
            return;
        }

        let attempts = record.mock_attempts + 1;
        match self.store.update(user_key, &RecordUpdate::attempts(attempts)).await {
            Ok(()) => info!("📊 {} has now used {} mock interviews", user_key, attempts),
            Err(e) => warn!("⚠️ Could not update attempt counter for {}: {}", user_key, e),
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

fn block(session: &mut InterviewSession, err: InterviewError) -> Outcome {
    session.record_error(err.clone());
    Outcome::Blocked(err)
}
