//! Speech synthesis capability
//!
//! The narration queue talks to the host's text-to-speech through this
//! trait. `speak` resolves when the utterance ends or fails; the queue
//! decides what happens next.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

/// One request to the speech capability
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// BCP 47 tag, e.g. `hi-IN`
    pub language: String,
    pub pitch: f64,
    pub rate: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SpeechError {
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// Output was cancelled before the utterance finished
    #[error("utterance interrupted")]
    Interrupted,
}

/// Host text-to-speech
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Whether the host can speak at all. Checked once.
    fn probe(&self) -> bool;

    /// Speak one utterance, resolving when it ends or errors.
    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError>;

    /// Silence all current and queued output immediately.
    fn cancel_all(&self);
}

/// Host without speech synthesis
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSpeech;

#[async_trait]
impl SpeechSynth for NullSpeech {
    fn probe(&self) -> bool {
        false
    }

    async fn speak(&self, _utterance: Utterance) -> Result<(), SpeechError> {
        Err(SpeechError::Synthesis("no speech synthesis on this host".to_string()))
    }

    fn cancel_all(&self) {}
}

/// Headless narrator: logs every line and takes as long as reading it
/// aloud would.
#[derive(Debug)]
pub struct TranscriptSpeech {
    chars_per_second: f64,
    /// Bumped by `cancel_all`; in-flight utterances watch for the change.
    epoch: watch::Sender<u64>,
}

impl TranscriptSpeech {
    pub fn new() -> Self {
        Self {
            chars_per_second: 14.0,
            epoch: watch::Sender::new(0),
        }
    }

    /// Estimated speaking time at the utterance's rate
    pub fn estimate(&self, utterance: &Utterance) -> Duration {
        let chars = utterance.text.chars().count() as f64;
        let rate = if utterance.rate > 0.0 { utterance.rate } else { 1.0 };
        Duration::from_secs_f64(chars / (self.chars_per_second * rate))
    }
}

impl Default for TranscriptSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynth for TranscriptSpeech {
    fn probe(&self) -> bool {
        true
    }

    async fn speak(&self, utterance: Utterance) -> Result<(), SpeechError> {
        let length = self.estimate(&utterance);
        info!(
            language = %utterance.language,
            seconds = length.as_secs_f64(),
            "narrator: {}",
            utterance.text
        );
        let mut epoch = self.epoch.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(length) => Ok(()),
            _ = epoch.changed() => Err(SpeechError::Interrupted),
        }
    }

    fn cancel_all(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }
}
