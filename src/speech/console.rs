//! Terminal speech backend: questions are printed (and optionally voiced by an
//! external TTS program), typed lines stand in for recognized speech.

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::process::Command;

use super::{ListenTag, RecognitionState, SpeechError, SpeechEvent, SpeechEventSender, SpeechService};
use crate::config::SpeechSettings;

struct ActiveRun {
    tag: ListenTag,
    events: SpeechEventSender,
    transcript: String,
}

pub struct ConsoleSpeech {
    settings: SpeechSettings,
    active: Mutex<Option<ActiveRun>>,
}

impl ConsoleSpeech {
    pub fn new(settings: SpeechSettings) -> Self {
        Self {
            settings,
            active: Mutex::new(None),
        }
    }

    /// Feeds one typed line into the running recognition.
    ///
    /// A non-empty line is a final segment appended to the run's transcript;
    /// an empty line ends the run the way an engine's end-of-speech would.
    /// Returns false when nothing is listening.
    pub fn feed_line(&self, line: &str) -> bool {
        let mut active = self.active.lock();
        let line = line.trim();

        if line.is_empty() {
            return match active.take() {
                Some(run) => {
                    let _ = run.events.send(SpeechEvent::state(run.tag, RecognitionState::Idle));
                    true
                }
                None => false,
            };
        }

        match active.as_mut() {
            Some(run) => {
                run.transcript.push(' ');
                run.transcript.push_str(line);
                let text = run.transcript.trim().to_string();
                let _ = run.events.send(SpeechEvent::transcript(run.tag, text, true));
                true
            }
            None => false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.active.lock().is_some()
    }
}

#[async_trait]
impl SpeechService for ConsoleSpeech {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::SynthesisFailed("Cannot speak empty text".to_string()));
        }

        println!("\n🎙️  Officer: {}", text);

        if let Some(program) = &self.settings.tts_command {
            let status = Command::new(program)
                .arg(text)
                .status()
                .await
                .map_err(|e| SpeechError::SynthesisFailed(format!("{}: {}", program, e)))?;
            if !status.success() {
                warn!("TTS command {} exited with {}", program, status);
                return Err(SpeechError::SynthesisFailed(format!("{} exited with {}", program, status)));
            }
        }

        Ok(())
    }

    async fn start_listening(&self, tag: ListenTag, events: SpeechEventSender) -> Result<(), SpeechError> {
        let previous = self.active.lock().replace(ActiveRun {
            tag,
            events: events.clone(),
            transcript: String::new(),
        });
        if let Some(run) = previous {
            debug!("Superseding recognition run {:?}", run.tag);
            let _ = run.events.send(SpeechEvent::state(run.tag, RecognitionState::Idle));
        }

        events
            .send(SpeechEvent::state(tag, RecognitionState::Listening))
            .map_err(|_| SpeechError::Unavailable("event channel closed".to_string()))?;

        println!("   (speak by typing; an empty line ends your answer, /submit sends it)");
        Ok(())
    }

    async fn stop_listening(&self) {
        if let Some(run) = self.active.lock().take() {
            let _ = run.events.send(SpeechEvent::state(run.tag, RecognitionState::Idle));
        }
    }
}
