use log::{debug, info};
use tokio::sync::mpsc;

use super::decision::Decision;
use super::engine::{InterviewController, Outcome};
use super::session::InterviewSession;
use crate::speech::{SpeechEvent, SpeechEventReceiver};

/// Actions the applicant can take while an interview is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Submit,
    Retry,
    RestartListening,
    Quit,
}

pub type CommandSender = mpsc::UnboundedSender<UserCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<UserCommand>;

/// Runs a session until it completes, is blocked, or the applicant quits.
///
/// Speech events and commands are applied one at a time. While an operation
/// is in flight only `Quit` is honoured; it drops the operation, so nothing it
/// would have done afterwards is applied. `observer` sees the session after
/// every operation.
pub async fn run_interview<F>(
    controller: &InterviewController,
    session: &mut InterviewSession,
    speech_events: &mut SpeechEventReceiver,
    commands: &mut CommandReceiver,
    mut observer: F,
) -> Option<Decision>
where
    F: FnMut(&InterviewSession, &Outcome),
{
    let outcome = tokio::select! {
        outcome = controller.start(session) => outcome,
        _ = quit_requested(commands) => {
            controller.abandon(session).await;
            return None;
        }
    };
    observer(session, &outcome);
    if matches!(outcome, Outcome::Blocked(_)) {
        return None;
    }

    loop {
        if let Some(decision) = session.decision() {
            return Some(decision.clone());
        }

        let step = tokio::select! {
            event = speech_events.recv() => match event {
                Some(event) => Step::Speech(event),
                None => Step::Closed,
            },
            command = commands.recv() => match command {
                Some(UserCommand::Quit) | None => Step::Closed,
                Some(command) => Step::Command(command),
            },
        };

        let outcome = match step {
            Step::Closed => {
                controller.abandon(session).await;
                return None;
            }
            Step::Speech(event) => {
                let op = controller.handle_speech_event(session, event);
                tokio::select! {
                    outcome = op => outcome,
                    _ = quit_requested(commands) => {
                        controller.abandon(session).await;
                        return None;
                    }
                }
            }
            Step::Command(command) => {
                debug!("Applying command {:?}", command);
                let op = async {
                    match command {
                        UserCommand::Submit => controller.submit(session).await,
                        UserCommand::Retry => controller.retry(session).await,
                        UserCommand::RestartListening => controller.restart_listening(session).await,
                        UserCommand::Quit => Outcome::Ignored,
                    }
                };
                tokio::select! {
                    outcome = op => outcome,
                    _ = quit_requested(commands) => {
                        controller.abandon(session).await;
                        return None;
                    }
                }
            }
        };

        if outcome != Outcome::Ignored {
            observer(session, &outcome);
        }
    }
}

enum Step {
    Speech(SpeechEvent),
    Command(UserCommand),
    Closed,
}

/// Resolves once the applicant quits or the command channel closes. Other
/// commands arriving meanwhile are dropped.
async fn quit_requested(commands: &mut CommandReceiver) {
    loop {
        match commands.recv().await {
            Some(UserCommand::Quit) | None => return,
            Some(command) => info!("Ignoring {:?} while busy", command),
        }
    }
}
