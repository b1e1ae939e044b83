//! Voice input/output capability.
//!
//! The turn controller only sees this trait: synthesis that completes, and a
//! recognition engine that streams tagged events into a channel. Any
//! text-to-speech / speech-to-text backend can sit behind it.

pub mod console;

pub use console::ConsoleSpeech;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionState {
    #[default]
    Idle,
    Listening,
    Processing,
    Error,
}

/// Identifies one listening run. Each run gets a fresh tag, so events from an
/// engine that was already stopped can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ListenTag(pub u64);

impl ListenTag {
    pub fn next(self) -> Self {
        ListenTag(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEventKind {
    /// Running transcript of the current run; longer is not guaranteed.
    Transcript { text: String, is_final: bool },
    StateChanged(RecognitionState),
    /// Engine error (no-speech, permission denied, audio capture...).
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeechEvent {
    pub tag: ListenTag,
    pub kind: SpeechEventKind,
}

impl SpeechEvent {
    pub fn transcript(tag: ListenTag, text: impl Into<String>, is_final: bool) -> Self {
        Self {
            tag,
            kind: SpeechEventKind::Transcript { text: text.into(), is_final },
        }
    }

    pub fn state(tag: ListenTag, state: RecognitionState) -> Self {
        Self { tag, kind: SpeechEventKind::StateChanged(state) }
    }

    pub fn failed(tag: ListenTag, reason: impl Into<String>) -> Self {
        Self { tag, kind: SpeechEventKind::Failed(reason.into()) }
    }
}

pub type SpeechEventSender = mpsc::UnboundedSender<SpeechEvent>;
pub type SpeechEventReceiver = mpsc::UnboundedReceiver<SpeechEvent>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error("Speech services not available: {0}")]
    Unavailable(String),
    #[error("Speech synthesis failed: {0}")]
    SynthesisFailed(String),
    #[error("Failed to start recognition: {0}")]
    RecognitionFailed(String),
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Speaks `text`, resolving once playback has finished.
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;

    /// Starts a recognition run; every event it produces carries `tag`.
    async fn start_listening(&self, tag: ListenTag, events: SpeechEventSender) -> Result<(), SpeechError>;

    /// Stops the current run, if any. Never blocks on the engine.
    async fn stop_listening(&self);
}
