//! Text-to-speech backends.
//!
//! A backend turns one phrase and one voice into an [`AudioClip`]. Two are
//! provided: an external open_jtalk-compatible command (always built) and
//! in-process Kokoro through sherpa-rs (`kokoro` feature).

mod command;
#[cfg(feature = "kokoro")]
mod kokoro;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::AudioClip;
use crate::speech::VoiceId;

pub use command::CommandSynthesizer;
#[cfg(feature = "kokoro")]
pub use kokoro::KokoroSynthesizer;

/// Why a phrase produced no audio.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("failed to start synthesis command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("synthesis command exited with {status}: {stderr}")]
    Exit { status: std::process::ExitStatus, stderr: String },
    #[error("synthesis produced no audio")]
    Empty,
    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to decode synthesized audio: {0}")]
    Decode(#[from] hound::Error),
    #[cfg_attr(not(feature = "kokoro"), allow(dead_code))]
    #[error("unknown voice '{0}'")]
    UnknownVoice(VoiceId),
    #[error("synthesis backend failed: {0}")]
    Backend(String),
}

/// Converts one phrase into audio.
///
/// Implementations may be called concurrently from many tasks.
#[async_trait]
pub trait PhraseSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<AudioClip, SynthesisError>;
}

/// Run one synthesis call under a time budget.
///
/// An empty clip counts as a failure.
pub async fn synthesize_with_timeout(
    synthesizer: &dyn PhraseSynthesizer,
    text: &str,
    voice: &VoiceId,
    timeout: Duration,
) -> Result<AudioClip, SynthesisError> {
    let clip = tokio::time::timeout(timeout, synthesizer.synthesize(text, voice))
        .await
        .map_err(|_| SynthesisError::Timeout(timeout))??;

    if clip.is_empty() {
        return Err(SynthesisError::Empty);
    }
    Ok(clip)
}
