//! Playback scheduler.
//!
//! Owns the sink and the ordering buffer. Bundles are played one at a time, in
//! the order the buffer releases them; every phrase of a bundle finishes before
//! the next phrase or bundle starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ordering::OrderingBuffer;
use super::request::Bundle;
use crate::audio::{Playback, PlaybackSink, SinkError};
use crate::config::ReaderConfig;

/// What happened to one released bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleOutcome {
    /// Every phrase was played
    Done,
    /// The bundle had no audio
    Silent,
    /// The sink never connected
    Dropped,
    /// The sink disconnected or playback was cancelled mid-bundle
    Aborted,
}

/// Counts of bundle outcomes over a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub played: usize,
    pub silent: usize,
    pub dropped: usize,
    pub aborted: usize,
}

impl PlaybackSummary {
    fn record(&mut self, outcome: BundleOutcome) {
        match outcome {
            BundleOutcome::Done => self.played += 1,
            BundleOutcome::Silent => self.silent += 1,
            BundleOutcome::Dropped => self.dropped += 1,
            BundleOutcome::Aborted => self.aborted += 1,
        }
    }
}

/// Result of waiting on the sink.
#[derive(Debug, PartialEq, Eq)]
enum SinkWait {
    Ready,
    Disconnected,
    Cancelled,
}

pub struct PlaybackScheduler {
    sink: Arc<dyn PlaybackSink>,
    buffer: OrderingBuffer,
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl PlaybackScheduler {
    pub fn new(sink: Arc<dyn PlaybackSink>, config: &ReaderConfig) -> Self {
        Self {
            sink,
            buffer: OrderingBuffer::new(),
            connect_timeout: config.connect_timeout,
            poll_interval: config.poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Play bundles until the channel closes or `cancel` fires.
    pub async fn run(mut self, mut bundles: mpsc::UnboundedReceiver<Bundle>, cancel: CancellationToken) -> PlaybackSummary {
        let mut summary = PlaybackSummary::default();

        loop {
            // Pick up everything that completed while the last bundle played
            while let Ok(bundle) = bundles.try_recv() {
                self.buffer.insert(bundle);
            }

            if let Some(bundle) = self.buffer.pop_ready() {
                let outcome = self.play_bundle(bundle, &cancel).await;
                summary.record(outcome);
                if cancel.is_cancelled() {
                    break;
                }
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = bundles.recv() => match received {
                    Some(bundle) => self.buffer.insert(bundle),
                    None => break,
                },
            }
        }

        if !self.buffer.is_empty() {
            warn!("Playback stopped with {} bundle(s) still buffered", self.buffer.len());
        }
        debug!("Playback scheduler finished: {:?}", summary);
        summary
    }

    async fn play_bundle(&self, bundle: Bundle, cancel: &CancellationToken) -> BundleOutcome {
        let lane = bundle.lane();
        let sequence_id = bundle.sequence_id;

        if bundle.phrases.is_empty() {
            debug!("{:?} bundle #{} has no audio, skipping", lane, sequence_id);
            return BundleOutcome::Silent;
        }

        match self.wait_connected(cancel).await {
            SinkWait::Ready => {}
            SinkWait::Cancelled => return BundleOutcome::Aborted,
            SinkWait::Disconnected => {
                warn!("Sink not connected after {:?}, dropping {:?} bundle #{}", self.connect_timeout, lane, sequence_id);
                return BundleOutcome::Dropped;
            }
        }

        info!(
            "🔊 Playing {:?} bundle #{} ({} phrase(s), {:.1}s)",
            lane,
            sequence_id,
            bundle.phrases.len(),
            bundle.duration().as_secs_f32()
        );

        for phrase in bundle.phrases {
            if self.wait_idle(cancel).await != SinkWait::Ready {
                return self.abort(sequence_id);
            }

            let playback = match self.sink.play(phrase.audio) {
                Ok(playback) => playback,
                Err(SinkError::Disconnected) => return self.abort(sequence_id),
                Err(e) => {
                    warn!("Failed to play phrase {} of bundle #{}: {}", phrase.index, sequence_id, e);
                    continue;
                }
            };

            if self.await_playback(playback, cancel).await != SinkWait::Ready {
                return self.abort(sequence_id);
            }
        }

        if self.wait_idle(cancel).await != SinkWait::Ready {
            return self.abort(sequence_id);
        }
        BundleOutcome::Done
    }

    fn abort(&self, sequence_id: u64) -> BundleOutcome {
        warn!("Playback of bundle #{} interrupted, skipping its remaining phrases", sequence_id);
        self.sink.stop();
        BundleOutcome::Aborted
    }

    /// Poll until the sink is connected, for at most the connect timeout.
    async fn wait_connected(&self, cancel: &CancellationToken) -> SinkWait {
        let deadline = Instant::now() + self.connect_timeout;
        loop {
            if self.sink.is_connected() {
                return SinkWait::Ready;
            }
            let now = Instant::now();
            if now >= deadline {
                return SinkWait::Disconnected;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SinkWait::Cancelled,
                _ = tokio::time::sleep(self.poll_interval.min(deadline - now)) => {}
            }
        }
    }

    /// Poll until the sink stops playing.
    async fn wait_idle(&self, cancel: &CancellationToken) -> SinkWait {
        loop {
            if !self.sink.is_connected() {
                return SinkWait::Disconnected;
            }
            if !self.sink.is_playing() {
                return SinkWait::Ready;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SinkWait::Cancelled,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Wait for one clip to end, watching the connection every poll interval.
    async fn await_playback(&self, playback: Playback, cancel: &CancellationToken) -> SinkWait {
        let mut ended = std::pin::pin!(playback.wait());
        let mut ticker = tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return SinkWait::Cancelled,
                _ = &mut ended => break,
                _ = ticker.tick() => {
                    if !self.sink.is_connected() {
                        return SinkWait::Disconnected;
                    }
                    // Sinks that lose track of the clip never signal completion
                    if !self.sink.is_playing() {
                        break;
                    }
                }
            }
        }

        if self.sink.is_connected() { SinkWait::Ready } else { SinkWait::Disconnected }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::speech::request::PhraseAudio;
    use crate::speech::testing::{RecordingSink, TEST_SAMPLE_RATE, clip_for};

    const PLAY_TIME: Duration = Duration::from_secs(1);

    fn config() -> ReaderConfig {
        ReaderConfig {
            connect_timeout: Duration::from_secs(3),
            output_sample_rate: TEST_SAMPLE_RATE,
            ..ReaderConfig::new(vec!["a".into(), "b".into()], "sys")
        }
    }

    fn bundle(sequence_id: u64, priority: bool, texts: &[&str]) -> Bundle {
        let phrases = texts
            .iter()
            .enumerate()
            .map(|(index, text)| PhraseAudio { index, audio: clip_for(text).into_stereo() })
            .collect();
        Bundle { sequence_id, priority, phrases }
    }

    fn start(
        sink: &RecordingSink,
    ) -> (mpsc::UnboundedSender<Bundle>, CancellationToken, tokio::task::JoinHandle<PlaybackSummary>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let scheduler = PlaybackScheduler::new(Arc::new(sink.clone()), &config());
        let handle = tokio::spawn(scheduler.run(rx, cancel.clone()));
        (tx, cancel, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bundles_play_in_sequence_order() {
        let sink = RecordingSink::new(PLAY_TIME);
        let (tx, _cancel, handle) = start(&sink);

        tx.send(bundle(2, false, &["C"])).unwrap();
        tx.send(bundle(1, false, &["B1", "B2"])).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(sink.played().is_empty(), "nothing plays while #0 is missing");

        tx.send(bundle(0, false, &["A"])).unwrap();
        drop(tx);
        let summary = handle.await.unwrap();

        assert_eq!(sink.played(), vec!["A", "B1", "B2", "C"]);
        assert_eq!(summary, PlaybackSummary { played: 3, ..Default::default() });

        let started = sink.started();
        for pair in started.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= PLAY_TIME, "{} overlapped {}", pair[1].0, pair[0].0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_plays_before_buffered_normal() {
        let sink = RecordingSink::new(PLAY_TIME);
        let (tx, _cancel, handle) = start(&sink);

        tx.send(bundle(0, false, &["n0"])).unwrap();
        tx.send(bundle(1, false, &["n1"])).unwrap();
        tx.send(bundle(2, false, &["n2"])).unwrap();
        // Arrives while n0 is playing and n1, n2 are buffered
        tokio::time::sleep(Duration::from_millis(500)).await;
        tx.send(bundle(0, true, &["p0"])).unwrap();
        tx.send(bundle(1, true, &["p1"])).unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(sink.played(), vec!["n0", "p0", "p1", "n1", "n2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_announcement_waits_without_releasing_chat() {
        let sink = RecordingSink::new(PLAY_TIME);
        let (tx, _cancel, handle) = start(&sink);

        tx.send(bundle(0, false, &["n0"])).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        // p1 finished synthesis first; p0 is still being rendered
        tx.send(bundle(1, true, &["p1"])).unwrap();
        tx.send(bundle(1, false, &["n1"])).unwrap();
        tx.send(bundle(2, false, &["n2"])).unwrap();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(sink.played(), vec!["n0"], "chat stays queued behind the pending announcement");

        tx.send(bundle(0, true, &["p0"])).unwrap();
        drop(tx);

        let summary = handle.await.unwrap();
        assert_eq!(sink.played(), vec!["n0", "p0", "p1", "n1", "n2"]);
        assert_eq!(summary, PlaybackSummary { played: 5, ..Default::default() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconnected_sink_drops_bundle() {
        let sink = RecordingSink::new(PLAY_TIME);
        sink.set_connected(false);
        let (tx, _cancel, handle) = start(&sink);

        tx.send(bundle(0, false, &["lost"])).unwrap();
        tx.send(bundle(1, false, &["kept"])).unwrap();
        drop(tx);

        // #0 gives up at 3s; #1 is still waiting when the sink connects
        tokio::time::sleep(Duration::from_secs(4)).await;
        sink.set_connected(true);

        let summary = handle.await.unwrap();
        assert_eq!(sink.played(), vec!["kept"]);
        assert_eq!(summary, PlaybackSummary { played: 1, dropped: 1, ..Default::default() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_aborts_current_bundle() {
        let sink = RecordingSink::new(PLAY_TIME);
        let (tx, _cancel, handle) = start(&sink);

        tx.send(bundle(0, false, &["one", "two", "three"])).unwrap();
        tx.send(bundle(1, false, &["next"])).unwrap();
        drop(tx);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        sink.set_connected(false);
        tokio::time::sleep(Duration::from_secs(1)).await;
        sink.set_connected(true);

        let summary = handle.await.unwrap();
        assert_eq!(sink.played(), vec!["one", "two", "next"]);
        assert_eq!(summary, PlaybackSummary { played: 1, aborted: 1, ..Default::default() });
        assert_eq!(sink.stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_bundle_advances_cursor() {
        let sink = RecordingSink::new(PLAY_TIME);
        let (tx, _cancel, handle) = start(&sink);

        tx.send(bundle(1, false, &["after"])).unwrap();
        tx.send(bundle(0, false, &[])).unwrap();
        drop(tx);

        let summary = handle.await.unwrap();
        assert_eq!(sink.played(), vec!["after"]);
        assert_eq!(summary, PlaybackSummary { played: 1, silent: 1, ..Default::default() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_playback() {
        let sink = RecordingSink::new(PLAY_TIME);
        let (tx, cancel, handle) = start(&sink);

        tx.send(bundle(0, false, &["first", "second"])).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();

        let summary = handle.await.unwrap();
        assert_eq!(sink.played(), vec!["first"]);
        assert_eq!(summary.aborted, 1);
        assert_eq!(sink.stops(), 1);
    }
}
