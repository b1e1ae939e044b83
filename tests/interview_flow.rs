use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use visamock_lib::completion::{ChatMessage, CompletionService, Role};
use visamock_lib::database::{
    InMemoryRecordStore, PaymentStatus, UserAttemptRecord, INTERVIEW_LOGS, VOICE_REVIEWS,
};
use visamock_lib::interview::decision::DEFAULT_VERDICT;
use visamock_lib::interview::questions::FALLBACK_QUESTIONS;
use visamock_lib::interview::{
    run_interview, ApplicantProfile, Decision, InterviewController, InterviewSession, Outcome, Phase,
    UserCommand,
};
use visamock_lib::speech::{
    ListenTag, RecognitionState, SpeechError, SpeechEvent, SpeechEventReceiver, SpeechEventSender,
    SpeechService,
};
use visamock_lib::InterviewError;

const USER: &str = "applicant@example.com";

const FOLLOW_UPS: [&str; 5] = [
    "Is this your first attempt at the visa interview?",
    "Who is sponsoring your education?",
    "What does your sponsor do for a living?",
    "What will you do after graduating?",
    "Do you have relatives in the United States?",
];

#[derive(Default)]
struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    runs: Mutex<Vec<ListenTag>>,
    stops: AtomicUsize,
}

#[async_trait]
impl SpeechService for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        self.spoken.lock().push(text.to_string());
        Ok(())
    }

    async fn start_listening(&self, tag: ListenTag, _events: SpeechEventSender) -> Result<(), SpeechError> {
        self.runs.lock().push(tag);
        Ok(())
    }

    async fn stop_listening(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    hang: bool,
}

impl ScriptedCompletion {
    fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn hanging() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.calls.lock().push(messages.to_vec());
        if self.hang {
            std::future::pending::<()>().await;
        }
        let next = self.replies.lock().pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

struct Harness {
    controller: InterviewController,
    session: InterviewSession,
    speech: Arc<RecordingSpeech>,
    completion: Arc<ScriptedCompletion>,
    store: Arc<InMemoryRecordStore>,
    events_tx: SpeechEventSender,
    events_rx: SpeechEventReceiver,
}

fn profile() -> ApplicantProfile {
    ApplicantProfile {
        university_name: "Purdue University".to_string(),
        program_name: "MS Data Science".to_string(),
        tuition: "30000".to_string(),
        living_cost: "12000".to_string(),
        scholarship: "4000".to_string(),
        total_coa: "42000".to_string(),
    }
}

fn record(attempts: u32, status: PaymentStatus) -> UserAttemptRecord {
    UserAttemptRecord {
        mock_attempts: attempts,
        payment_status: status,
        ..UserAttemptRecord::new(USER)
    }
}

fn harness(store: InMemoryRecordStore, completion: ScriptedCompletion) -> Harness {
    let speech = Arc::new(RecordingSpeech::default());
    let completion = Arc::new(completion);
    let store = Arc::new(store);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let controller = InterviewController::new(speech.clone(), completion.clone(), store.clone(), events_tx.clone());
    Harness {
        controller,
        session: InterviewSession::new(USER, profile()),
        speech,
        completion,
        store,
        events_tx,
        events_rx,
    }
}

fn full_script(decision: &str) -> ScriptedCompletion {
    let mut replies: Vec<Result<&str, &str>> = FOLLOW_UPS.iter().map(|q| Ok(*q)).collect();
    replies.push(Ok(decision));
    ScriptedCompletion::new(replies)
}

impl Harness {
    async fn say(&mut self, text: &str) -> Outcome {
        let tag = self.session.listen_tag();
        self.controller
            .handle_speech_event(&mut self.session, SpeechEvent::transcript(tag, text, true))
            .await
    }

    async fn answer(&mut self, text: &str) -> Outcome {
        self.say(text).await;
        self.controller.submit(&mut self.session).await
    }

    async fn run_to_completion(&mut self) -> Outcome {
        assert!(matches!(
            self.controller.start(&mut self.session).await,
            Outcome::QuestionIssued { number: 1, .. }
        ));
        let mut last = Outcome::Ignored;
        for i in 1..=6 {
            last = self.answer(&format!("Answer number {}", i)).await;
        }
        last
    }
}

#[tokio::test]
async fn test_full_interview_is_accepted_and_counted() {
    let store = InMemoryRecordStore::new().with_record(USER, record(0, PaymentStatus::Free));
    let mut h = harness(store, full_script("DECISION: Your visa is accepted.\nFEEDBACK: Clear plans."));

    let outcome = h.run_to_completion().await;

    let Outcome::Completed(decision) = outcome else {
        panic!("interview did not complete: {:?}", outcome);
    };
    assert_eq!(decision.verdict, "Your visa is accepted.");
    assert!(decision.accepted);
    assert_eq!(h.session.phase(), Phase::Complete);
    assert_eq!(h.session.status(), "Interview Complete");
    assert_eq!(h.session.turns().len(), 6);
    assert_eq!(h.session.turns()[0].question, "Why did you choose to study at Purdue University?");
    assert_eq!(h.session.turns()[5].answer, "Answer number 6");
    assert_eq!(h.store.record(USER).unwrap().mock_attempts, 1);

    let logs = h.store.log_entries(INTERVIEW_LOGS);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["email"], USER);
    assert_eq!(logs[0]["attemptNumber"], 1);
}

#[tokio::test]
async fn test_conversation_is_rebuilt_from_every_turn() {
    let mut h = harness(InMemoryRecordStore::new(), full_script("DECISION: Your visa is accepted."));
    h.run_to_completion().await;

    let calls = h.completion.calls();
    assert_eq!(calls.len(), 6);

    // The fifth call carries the persona, four committed turns and the open exchange.
    let fifth = &calls[4];
    assert_eq!(fifth.len(), 1 + 4 * 2 + 2);
    assert_eq!(fifth[0].role, Role::System);
    assert!(fifth[0].content.contains("Purdue University"));
    assert_eq!(fifth[1].content, "Why did you choose to study at Purdue University?");
    assert_eq!(fifth[2].content, "Answer number 1");
    assert_eq!(fifth[fifth.len() - 2].content, FOLLOW_UPS[3]);
    assert_eq!(fifth.last().unwrap().content, "Answer number 5");

    let decision_call = &calls[5];
    assert_eq!(decision_call.len(), 2);
    assert!(decision_call[1].content.contains("A6: Answer number 6"));
}

#[tokio::test]
async fn test_two_failures_fall_back_to_pool_question() {
    let completion = ScriptedCompletion::new(vec![Err("upstream 503"), Err("upstream 503")]);
    let mut h = harness(InMemoryRecordStore::new(), completion);
    h.controller.start(&mut h.session).await;

    let first = h.answer("I like the research labs").await;
    assert!(matches!(first, Outcome::AwaitingRetry(InterviewError::CompletionServiceFailure(_))));
    assert_eq!(h.session.phase(), Phase::AwaitingRetry);
    assert_eq!(h.session.status(), "Something went wrong. Please try again.");
    assert!(h.session.turns().is_empty());

    let second = h.controller.retry(&mut h.session).await;
    assert_eq!(
        second,
        Outcome::QuestionIssued {
            number: 2,
            question: FALLBACK_QUESTIONS[0].to_string(),
            fallback: true,
        }
    );
    assert_eq!(h.session.turns().len(), 1);
    assert_eq!(h.session.turns()[0].answer, "I like the research labs");
    assert_eq!(h.session.phase(), Phase::Listening);
    assert_eq!(h.speech.spoken.lock().last().unwrap(), FALLBACK_QUESTIONS[0]);
}

#[tokio::test]
async fn test_fallback_pool_advances_within_a_session() {
    let completion = ScriptedCompletion::new(vec![
        Err("upstream 503"),
        Err("upstream 503"),
        Ok("Okay."),
        Ok("I see, go on."),
    ]);
    let mut h = harness(InMemoryRecordStore::new(), completion);
    h.controller.start(&mut h.session).await;

    h.answer("The research labs").await;
    let first = h.controller.retry(&mut h.session).await;
    assert!(matches!(first, Outcome::QuestionIssued { number: 2, fallback: true, .. }));
    assert_eq!(h.session.open_question(), Some(FALLBACK_QUESTIONS[0]));

    let outcome = h.answer("Work in analytics back home").await;
    assert!(matches!(outcome, Outcome::AwaitingRetry(InterviewError::InvalidCompletionReply { .. })));
    let second = h.controller.retry(&mut h.session).await;
    assert_eq!(
        second,
        Outcome::QuestionIssued {
            number: 3,
            question: FALLBACK_QUESTIONS[1].to_string(),
            fallback: true,
        }
    );

    let turns = h.session.turns();
    assert_eq!(turns.len(), 2);
    assert!(!turns[0].fallback);
    assert_eq!(turns[1].question, FALLBACK_QUESTIONS[0]);
    assert!(turns[1].fallback);
    assert_eq!(h.completion.calls().len(), 4);
}

#[tokio::test]
async fn test_retry_resends_answer_without_duplicating_turns() {
    let completion = ScriptedCompletion::new(vec![Ok("I see."), Ok(FOLLOW_UPS[1])]);
    let mut h = harness(InMemoryRecordStore::new(), completion);
    h.controller.start(&mut h.session).await;

    let outcome = h.answer("My father is sponsoring me").await;
    let Outcome::AwaitingRetry(InterviewError::InvalidCompletionReply { reply }) = outcome else {
        panic!("expected an invalid reply, got {:?}", outcome);
    };
    assert_eq!(reply, "I see.");
    assert!(h.session.status().contains("AI Response: I see."));

    let outcome = h.controller.retry(&mut h.session).await;
    assert!(matches!(outcome, Outcome::QuestionIssued { number: 2, fallback: false, .. }));
    assert_eq!(h.controller.retry(&mut h.session).await, Outcome::Ignored);
    assert_eq!(h.session.turns().len(), 1);

    let calls = h.completion.calls();
    assert_eq!(calls[0], calls[1]);
}

#[tokio::test]
async fn test_repeated_question_counts_as_invalid() {
    let opening = "Why did you choose to study at Purdue University?";
    let completion = ScriptedCompletion::new(vec![Ok(opening)]);
    let mut h = harness(InMemoryRecordStore::new(), completion);
    h.controller.start(&mut h.session).await;

    let outcome = h.answer("Because of its ranking").await;
    assert!(matches!(outcome, Outcome::AwaitingRetry(InterviewError::InvalidCompletionReply { .. })));
}

#[tokio::test]
async fn test_pending_payment_blocks_start() {
    let store = InMemoryRecordStore::new().with_record(USER, record(2, PaymentStatus::Pending));
    let mut h = harness(store, ScriptedCompletion::default());

    let outcome = h.controller.start(&mut h.session).await;

    assert_eq!(outcome, Outcome::Blocked(InterviewError::ApprovalPending));
    assert_eq!(h.session.phase(), Phase::WaitingToStart);
    assert!(h.session.turns().is_empty());
    assert!(h.session.status().contains("pending approval"));
    assert!(h.speech.spoken.lock().is_empty());
    assert!(h.store.log_entries(INTERVIEW_LOGS).is_empty());
    assert_eq!(h.store.record(USER).unwrap().mock_attempts, 2);
}

#[tokio::test]
async fn test_exhausted_free_attempts_block_start() {
    let store = InMemoryRecordStore::new().with_record(USER, record(5, PaymentStatus::Free));
    let mut h = harness(store, ScriptedCompletion::default());

    let outcome = h.controller.start(&mut h.session).await;
    assert_eq!(outcome, Outcome::Blocked(InterviewError::EntitlementDenied));
    assert_eq!(h.session.last_error(), Some(&InterviewError::EntitlementDenied));
}

#[tokio::test]
async fn test_approved_user_is_never_counted() {
    let store = InMemoryRecordStore::new().with_record(USER, record(10, PaymentStatus::Approved));
    let mut h = harness(store, full_script("DECISION: Your visa application is denied.\nFEEDBACK: Weak ties."));

    let outcome = h.run_to_completion().await;

    assert!(matches!(outcome, Outcome::Completed(Decision { accepted: false, .. })));
    assert_eq!(h.store.record(USER).unwrap().mock_attempts, 10);
}

#[tokio::test]
async fn test_first_use_creates_record() {
    let mut h = harness(InMemoryRecordStore::new(), full_script("DECISION: Your visa is accepted."));
    h.run_to_completion().await;

    let stored = h.store.record(USER).unwrap();
    assert_eq!(stored.mock_attempts, 1);
    assert_eq!(stored.payment_status, PaymentStatus::Free);
}

#[tokio::test]
async fn test_unstructured_verdict_defaults_to_denial() {
    let mut h = harness(InMemoryRecordStore::new(), full_script("You did well, good luck."));

    let outcome = h.run_to_completion().await;

    let Outcome::Completed(decision) = outcome else {
        panic!("interview did not complete: {:?}", outcome);
    };
    assert_eq!(decision.verdict, DEFAULT_VERDICT);
    assert!(!decision.extracted);
}

#[tokio::test]
async fn test_decision_call_failing_twice_completes_with_default() {
    let mut replies: Vec<Result<&str, &str>> = FOLLOW_UPS.iter().map(|q| Ok(*q)).collect();
    replies.push(Err("timeout"));
    replies.push(Err("timeout"));
    let store = InMemoryRecordStore::new().with_record(USER, record(1, PaymentStatus::Free));
    let mut h = harness(store, ScriptedCompletion::new(replies));

    let outcome = h.run_to_completion().await;
    assert!(matches!(outcome, Outcome::AwaitingRetry(_)));
    assert_eq!(h.session.turns().len(), 5);

    let outcome = h.controller.retry(&mut h.session).await;
    assert_eq!(outcome, Outcome::Completed(Decision::conservative_default()));
    assert_eq!(h.session.turns().len(), 6);
    assert_eq!(h.store.record(USER).unwrap().mock_attempts, 2);
}

#[tokio::test]
async fn test_stale_listening_events_are_ignored() {
    let mut h = harness(InMemoryRecordStore::new(), ScriptedCompletion::default());
    h.controller.start(&mut h.session).await;
    let old_tag = h.session.listen_tag();

    assert_eq!(h.controller.restart_listening(&mut h.session).await, Outcome::Listening);
    assert_ne!(h.session.listen_tag(), old_tag);

    let stale = SpeechEvent::transcript(old_tag, "late words from the old engine", true);
    assert_eq!(h.controller.handle_speech_event(&mut h.session, stale).await, Outcome::Ignored);
    let stale_end = SpeechEvent::state(old_tag, RecognitionState::Idle);
    assert_eq!(h.controller.handle_speech_event(&mut h.session, stale_end).await, Outcome::Ignored);

    assert_eq!(h.session.transcript(), "");
    assert_eq!(h.session.phase(), Phase::Listening);
    assert_eq!(h.speech.runs.lock().len(), 2);
}

#[tokio::test]
async fn test_shorter_transcript_does_not_replace_longer() {
    let mut h = harness(InMemoryRecordStore::new(), ScriptedCompletion::default());
    h.controller.start(&mut h.session).await;

    assert!(matches!(h.say("My uncle pays for everything").await, Outcome::TranscriptUpdated(_)));
    assert_eq!(h.say("My uncle").await, Outcome::Ignored);
    assert_eq!(h.session.transcript(), "My uncle pays for everything");
}

#[tokio::test]
async fn test_engine_end_submits_or_waits() {
    let completion = ScriptedCompletion::new(vec![Ok(FOLLOW_UPS[0])]);
    let mut h = harness(InMemoryRecordStore::new(), completion);
    h.controller.start(&mut h.session).await;

    let tag = h.session.listen_tag();
    let ended = h
        .controller
        .handle_speech_event(&mut h.session, SpeechEvent::state(tag, RecognitionState::Idle))
        .await;
    assert_eq!(ended, Outcome::RecognitionEnded);
    assert!(h.session.recognition_ended());
    assert_eq!(h.controller.submit(&mut h.session).await, Outcome::NothingToSubmit);

    h.controller.restart_listening(&mut h.session).await;
    h.say("For the data science curriculum").await;
    let tag = h.session.listen_tag();
    let outcome = h
        .controller
        .handle_speech_event(&mut h.session, SpeechEvent::state(tag, RecognitionState::Idle))
        .await;
    assert!(matches!(outcome, Outcome::QuestionIssued { number: 2, .. }));
    assert_eq!(h.session.turns()[0].answer, "For the data science curriculum");
}

#[tokio::test]
async fn test_recognition_error_keeps_transcript() {
    let mut h = harness(InMemoryRecordStore::new(), ScriptedCompletion::default());
    h.controller.start(&mut h.session).await;
    h.say("I want to").await;

    let tag = h.session.listen_tag();
    let outcome = h
        .controller
        .handle_speech_event(&mut h.session, SpeechEvent::failed(tag, "no-speech"))
        .await;
    assert!(matches!(outcome, Outcome::RecognitionFailed(InterviewError::RecognitionFailure(_))));
    assert_eq!(h.session.recognition(), RecognitionState::Error);

    // The engine's own end after an error is not a submission.
    let end = SpeechEvent::state(tag, RecognitionState::Idle);
    assert_eq!(h.controller.handle_speech_event(&mut h.session, end).await, Outcome::RecognitionEnded);
    assert_eq!(h.session.transcript(), "I want to");
    assert!(h.session.turns().is_empty());
}

#[tokio::test]
async fn test_whitespace_answer_is_not_sent() {
    let mut h = harness(InMemoryRecordStore::new(), ScriptedCompletion::default());
    h.controller.start(&mut h.session).await;

    assert_eq!(h.answer("   ").await, Outcome::NothingToSubmit);
    assert!(h.completion.calls().is_empty());
    assert_eq!(h.session.phase(), Phase::Listening);
}

#[tokio::test]
async fn test_review_only_once_after_completion() {
    let mut h = harness(InMemoryRecordStore::new(), full_script("DECISION: Your visa is accepted."));
    h.controller.start(&mut h.session).await;
    assert!(matches!(
        h.controller.submit_review(&mut h.session, "Great", 5).await,
        Err(InterviewError::InvalidReview(_))
    ));

    for i in 1..=6 {
        h.answer(&format!("Answer number {}", i)).await;
    }
    assert!(h.controller.submit_review(&mut h.session, "Too hard", 0).await.is_err());
    h.controller.submit_review(&mut h.session, "Felt realistic", 4).await.unwrap();
    assert!(h.controller.submit_review(&mut h.session, "Again", 3).await.is_err());

    let reviews = h.store.log_entries(VOICE_REVIEWS);
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["rating"], 4);
    assert_eq!(reviews[0]["result"], "Your visa is accepted.");
}

#[tokio::test]
async fn test_quit_abandons_in_flight_submission() {
    let Harness {
        controller,
        mut session,
        speech,
        events_tx,
        mut events_rx,
        ..
    } = harness(InMemoryRecordStore::new(), ScriptedCompletion::hanging());
    let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();

    let script = async {
        // The opening question's listening run is the first one.
        let tag = ListenTag::default().next();
        events_tx
            .send(SpeechEvent::transcript(tag, "My parents will pay", true))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        commands_tx.send(UserCommand::Submit).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        commands_tx.send(UserCommand::Quit).unwrap();
    };

    let mut observed = Vec::new();
    let driver = run_interview(&controller, &mut session, &mut events_rx, &mut commands_rx, |_, outcome| {
        observed.push(outcome.clone())
    });

    let (decision, ()) = tokio::join!(driver, script);

    assert!(decision.is_none());
    assert!(matches!(observed[0], Outcome::QuestionIssued { number: 1, .. }));
    assert_eq!(session.phase(), Phase::Submitting);
    assert!(session.turns().is_empty());
    // Stopped once on submit and once on teardown.
    assert_eq!(speech.stops.load(Ordering::SeqCst), 2);
}
