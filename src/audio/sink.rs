//! Voice output sink abstraction.
//!
//! A sink can play one clip at a time. Every `play` call hands back a
//! [`Playback`] that resolves exactly once, when the clip finished or was stopped.

use thiserror::Error;
use tokio::sync::oneshot;

use super::AudioClip;

/// How a single playback ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEnd {
    Finished,
    Stopped,
}

/// Errors reported by sinks when starting playback.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink is not connected")]
    Disconnected,
    #[error("sink I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode audio: {0}")]
    Encode(#[from] hound::Error),
    #[cfg_attr(not(feature = "speaker"), allow(dead_code))]
    #[error("audio device error: {0}")]
    Device(String),
}

/// Destination for synthesized speech (a voice channel, the local speaker, a spool directory).
///
/// `is_playing` must report `true` from a successful `play` until that
/// playback ends or `stop` is called.
pub trait PlaybackSink: Send + Sync {
    fn is_connected(&self) -> bool;

    fn is_playing(&self) -> bool;

    /// Start playing a clip. Does not wait for it to finish.
    fn play(&self, clip: AudioClip) -> Result<Playback, SinkError>;

    /// Stop the current clip, resolving its [`Playback`] as stopped.
    fn stop(&self);
}

/// Sink-side half of a playback completion signal.
///
/// Dropping it without calling [`complete`](Self::complete) reports the
/// playback as stopped, so the waiting side is always released.
#[derive(Debug)]
pub struct PlaybackDone {
    tx: Option<oneshot::Sender<PlaybackEnd>>,
}

impl PlaybackDone {
    pub fn complete(mut self, end: PlaybackEnd) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(end);
        }
    }
}

impl Drop for PlaybackDone {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(PlaybackEnd::Stopped);
        }
    }
}

/// Scheduler-side half of a playback completion signal.
#[derive(Debug)]
pub struct Playback {
    rx: oneshot::Receiver<PlaybackEnd>,
}

impl Playback {
    /// Create a linked completion pair.
    pub fn channel() -> (PlaybackDone, Self) {
        let (tx, rx) = oneshot::channel();
        (PlaybackDone { tx: Some(tx) }, Self { rx })
    }

    /// A playback that has already ended (for sinks that complete synchronously).
    pub fn ended(end: PlaybackEnd) -> Self {
        let (done, playback) = Self::channel();
        done.complete(end);
        playback
    }

    /// Wait until the sink reports the end of this playback.
    pub async fn wait(self) -> PlaybackEnd {
        self.rx.await.unwrap_or(PlaybackEnd::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_is_delivered() {
        let (done, playback) = Playback::channel();
        done.complete(PlaybackEnd::Finished);
        assert_eq!(playback.wait().await, PlaybackEnd::Finished);
    }

    #[tokio::test]
    async fn test_dropped_done_reports_stopped() {
        let (done, playback) = Playback::channel();
        drop(done);
        assert_eq!(playback.wait().await, PlaybackEnd::Stopped);
    }

    #[tokio::test]
    async fn test_ended_playback_resolves_immediately() {
        assert_eq!(Playback::ended(PlaybackEnd::Finished).wait().await, PlaybackEnd::Finished);
    }
}
