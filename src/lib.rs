use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub mod completion;
pub mod config;
pub mod database;
pub mod error;
pub mod interview;
pub mod speech;
pub mod transcription_buffer;

pub use error::InterviewError;

use completion::openai::OpenAICompatibleClient;
use config::Settings;
use database::{get_or_create, InMemoryRecordStore, PostgresRecordStore, RecordStore};
use interview::{
    attempts_left, request_upgrade, run_interview, ApplicantProfile, AttemptsLeft, CommandSender,
    InterviewController, InterviewSession, Outcome, PaymentDetails, UserCommand,
};
use speech::ConsoleSpeech;

/// Console requests that are handled outside of a running interview.
#[derive(Debug, PartialEq)]
enum ConsoleRequest {
    Review { rating: u8, text: String },
    Upgrade { name: String, number: String },
}

/// One line typed at the console.
#[derive(Debug, PartialEq)]
enum ConsoleInput {
    Speech(String),
    Command(UserCommand),
    Request(ConsoleRequest),
    Usage(&'static str),
    Unknown(String),
}

const REVIEW_USAGE: &str = "Usage: /review <1-5> <comments>";
const UPGRADE_USAGE: &str = "Usage: /upgrade <name> <number>";

/// Slash commands take the first word as the command. `/review` reads the
/// rating and keeps the rest as text; `/upgrade` takes the last word as the
/// number and everything before it as the name.
fn parse_console_line(line: &str) -> ConsoleInput {
    let Some(command) = line.trim().strip_prefix('/') else {
        return ConsoleInput::Speech(line.to_string());
    };
    let (name, args) = command.split_once(' ').unwrap_or((command, ""));
    let args = args.trim();

    match name {
        "submit" => ConsoleInput::Command(UserCommand::Submit),
        "retry" => ConsoleInput::Command(UserCommand::Retry),
        "restart" => ConsoleInput::Command(UserCommand::RestartListening),
        "quit" => ConsoleInput::Command(UserCommand::Quit),
        "review" => {
            let (rating, text) = args.split_once(' ').unwrap_or((args, ""));
            match rating.parse::<u8>() {
                Ok(rating) => ConsoleInput::Request(ConsoleRequest::Review {
                    rating,
                    text: text.trim().to_string(),
                }),
                Err(_) => ConsoleInput::Usage(REVIEW_USAGE),
            }
        }
        "upgrade" => match args.rsplit_once(' ') {
            Some((name, number)) if !name.trim().is_empty() => ConsoleInput::Request(ConsoleRequest::Upgrade {
                name: name.trim().to_string(),
                number: number.to_string(),
            }),
            _ => ConsoleInput::Usage(UPGRADE_USAGE),
        },
        other => ConsoleInput::Unknown(other.to_string()),
    }
}

/// Runs one interview from the terminal.
///
/// `profile_path` points at the applicant's I-20 details; `user_key` is the
/// email the attempt record is kept under.
pub async fn run(profile_path: &str, user_key: &str) -> Result<()> {
    let settings = Settings::load()?;
    let profile = ApplicantProfile::load(profile_path)?;

    let store: Arc<dyn RecordStore> = if settings.database.enabled {
        Arc::new(PostgresRecordStore::connect(&settings.database).await?)
    } else {
        info!("Database disabled, keeping attempt records in memory");
        Arc::new(InMemoryRecordStore::new())
    };
    let completion = Arc::new(OpenAICompatibleClient::new(settings.completion.clone()));
    let speech = Arc::new(ConsoleSpeech::new(settings.speech.clone()));

    let (speech_tx, mut speech_rx) = mpsc::unbounded_channel();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    let (request_tx, mut request_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_console(speech.clone(), command_tx, request_tx));

    let record = get_or_create(store.as_ref(), user_key).await?;
    match attempts_left(&record) {
        AttemptsLeft::Unlimited => println!("Unlimited mock interviews (approved account)."),
        AttemptsLeft::Limited(n) => println!("{} free mock interview(s) left.", n),
    }
    println!("Type your answer; /submit to send it, /retry, /restart or /quit.");

    let controller = InterviewController::new(speech, completion, store.clone(), speech_tx);
    let mut session = InterviewSession::new(user_key, profile);

    let decision = run_interview(&controller, &mut session, &mut speech_rx, &mut command_rx, render).await;

    let Some(decision) = decision else {
        if matches!(session.last_error(), Some(InterviewError::EntitlementDenied)) {
            println!("Submit payment details with /upgrade <name> <number>, or /quit.");
            while let Some(request) = request_rx.recv().await {
                if let ConsoleRequest::Upgrade { name, number } = request {
                    match request_upgrade(store.as_ref(), user_key, &PaymentDetails { name, number }).await {
                        Ok(_) => {
                            println!("Payment info submitted! Waiting for admin approval.");
                            break;
                        }
                        Err(e) => println!("{}", e.status_message()),
                    }
                }
            }
        }
        return Ok(());
    };

    println!("\n=== {} ===", decision.verdict);
    println!("{}", decision.feedback);
    println!("\nRate this interview with /review <1-5> <comments>, or /quit.");

    while let Some(request) = request_rx.recv().await {
        if let ConsoleRequest::Review { rating, text } = request {
            match controller.submit_review(&mut session, &text, rating).await {
                Ok(()) => {
                    println!("Thank you for your review!");
                    break;
                }
                Err(e) => println!("{}", e.status_message()),
            }
        }
    }
    Ok(())
}

fn render(session: &InterviewSession, outcome: &Outcome) {
    match outcome {
        Outcome::QuestionIssued { number, fallback, .. } => {
            let source = if *fallback { " (fallback)" } else { "" };
            println!("[Question {}{}] {}", number, source, session.status());
        }
        Outcome::TranscriptUpdated(text) => println!("  … {}", text),
        Outcome::Completed(_) => println!("[{}]", session.status()),
        Outcome::AwaitingRetry(_) => println!("{}\nType /retry to resend your answer.", session.status()),
        Outcome::RecognitionFailed(_) | Outcome::RecognitionEnded => {
            println!("{} Type /restart to keep answering or /submit.", session.status())
        }
        Outcome::Blocked(err) if err.is_retryable() => {
            println!("{} Run visamock again to retry.", session.status())
        }
        _ => println!("{}", session.status()),
    }
}

/// Reads stdin for the whole run: slash commands go to the interview or the
/// post-interview prompt, anything else is heard as speech.
async fn read_console(
    speech: Arc<ConsoleSpeech>,
    commands: CommandSender,
    requests: mpsc::UnboundedSender<ConsoleRequest>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        };

        let sent = match parse_console_line(&line) {
            ConsoleInput::Speech(text) => {
                if speech.is_listening() {
                    speech.feed_line(&text);
                } else if !text.trim().is_empty() {
                    println!("(not listening right now)");
                }
                true
            }
            ConsoleInput::Command(UserCommand::Quit) => {
                let _ = commands.send(UserCommand::Quit);
                break;
            }
            ConsoleInput::Command(command) => commands.send(command).is_ok(),
            ConsoleInput::Request(request) => requests.send(request).is_ok(),
            ConsoleInput::Usage(usage) => {
                println!("{}", usage);
                true
            }
            ConsoleInput::Unknown(name) => {
                println!("Unknown command /{}", name);
                true
            }
        };
        if !sent {
            break;
        }
    }
}
