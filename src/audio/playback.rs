//! Local speaker sink using cpal.
//!
//! Clips are pushed into a lock-free ring buffer drained by the audio callback.
//! The callback signals completion once the buffer runs dry, so `play` never blocks.
//! A stream error marks the sink disconnected; the stream is then rebuilt on the
//! next connection check, at most once per [`REOPEN_INTERVAL`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, error, info, warn};

use super::sink::{Playback, PlaybackDone, PlaybackEnd, PlaybackSink, SinkError};
use super::util::{find_best_config, get_device_name};
use super::AudioClip;

/// Size of the playback ring buffer in samples (~30 seconds of 48kHz stereo)
const PLAYBACK_RING_SIZE: usize = 48000 * 2 * 30;

/// Minimum time between attempts to rebuild a failed output stream
const REOPEN_INTERVAL: Duration = Duration::from_secs(2);

/// Flags shared between the sink and the audio callback.
struct Signals {
    /// Tells the callback to discard whatever is queued
    interrupt: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    /// Cleared when the stream reports an error
    connected: Arc<AtomicBool>,
    pending_done: Arc<Mutex<Option<PlaybackDone>>>,
}

/// One open output stream and the producer feeding it.
struct Output {
    /// Kept alive to maintain the audio stream
    _stream: Stream,
    sample_rate: u32,
    channels: usize,
    producer: ringbuf::HeapProd<f32>,
}

/// Rate limit for stream rebuilds.
struct ReopenGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl ReopenGate {
    fn new(interval: Duration) -> Self {
        Self { interval, last: Mutex::new(None) }
    }

    /// Whether a rebuild may be attempted at `now`; records the attempt if so.
    fn try_pass(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Speaker output on the default device.
pub struct SpeakerSink {
    preferred_rate: u32,
    output: Mutex<Output>,
    signals: Signals,
    reopen: ReopenGate,
}

impl SpeakerSink {
    /// Open the default output device.
    ///
    /// # Arguments
    /// * `preferred_rate` - Sample rate to request when the device has no default config
    ///
    /// # Errors
    /// Returns an error if no output device is available or the stream cannot be built.
    pub fn new(preferred_rate: u32) -> Result<Self> {
        let signals = Signals {
            interrupt: Arc::new(AtomicBool::new(false)),
            playing: Arc::new(AtomicBool::new(false)),
            connected: Arc::new(AtomicBool::new(true)),
            pending_done: Arc::new(Mutex::new(None)),
        };

        let output = open_output(preferred_rate, &signals)?;

        Ok(Self { preferred_rate, output: Mutex::new(output), signals, reopen: ReopenGate::new(REOPEN_INTERVAL) })
    }

    /// Replace a failed stream with a fresh one on the current default device.
    fn try_reopen(&self) {
        if !self.reopen.try_pass(Instant::now()) {
            return;
        }

        // Anything queued on the broken stream is lost
        self.stop();

        match open_output(self.preferred_rate, &self.signals) {
            Ok(output) => {
                *self.output.lock() = output;
                self.signals.connected.store(true, Ordering::SeqCst);
                info!("🔈 Speaker output reopened");
            }
            Err(e) => warn!("Speaker output still unavailable, retrying in {:?}: {}", REOPEN_INTERVAL, e),
        }
    }

    /// Lay the clip out the way the device wants it.
    fn device_samples(clip: AudioClip, sample_rate: u32, channels: usize) -> Result<Vec<f32>, SinkError> {
        let clip = clip.resampled(sample_rate).map_err(|e| SinkError::Device(e.to_string()))?;

        let clip_channels = clip.channels.max(1) as usize;
        Ok(match channels {
            1 => clip.downmix(),
            n if n == clip_channels => clip.samples,
            n => clip.samples.chunks_exact(clip_channels).flat_map(|frame| (0..n).map(move |ch| frame[ch % clip_channels])).collect(),
        })
    }
}

/// Build and start an output stream on the default device.
fn open_output(preferred_rate: u32, signals: &Signals) -> Result<Output> {
    let host = cpal::default_host();
    let device = host.default_output_device().context("No output device available")?;

    info!("Using output device: {}", get_device_name(&device));

    let sample_rate = match device.default_output_config() {
        Ok(default_config) => default_config.sample_rate(),
        Err(_) => {
            let supported_configs = device.supported_output_configs().context("Failed to get supported output configs")?;
            find_best_config(supported_configs, preferred_rate)?.sample_rate()
        }
    };

    let supported_configs = device.supported_output_configs().context("Failed to get supported output configs")?;
    let config = find_best_config(supported_configs, sample_rate)?;
    let channels = config.channels() as usize;
    let stream_config: StreamConfig = config.config();

    let (producer, mut consumer) = HeapRb::<f32>::new(PLAYBACK_RING_SIZE).split();

    let interrupt_cb = signals.interrupt.clone();
    let playing_cb = signals.playing.clone();
    let pending_done_cb = signals.pending_done.clone();
    let connected_err = signals.connected.clone();

    let err_fn = move |err| {
        // Log once per disconnect
        if connected_err.swap(false, Ordering::SeqCst) {
            error!("Audio output error, speaker disconnected: {}", err);
        }
    };

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            let interrupted = interrupt_cb.swap(false, Ordering::SeqCst);
            if interrupted {
                consumer.clear();
            }

            for sample in data.iter_mut() {
                *sample = consumer.try_pop().unwrap_or(0.0);
            }

            if playing_cb.load(Ordering::SeqCst) && consumer.is_empty() {
                playing_cb.store(false, Ordering::SeqCst);
                // Never block the audio thread; the scheduler also watches `is_playing`
                if let Some(mut slot) = pending_done_cb.try_lock()
                    && let Some(done) = slot.take()
                {
                    done.complete(if interrupted { PlaybackEnd::Stopped } else { PlaybackEnd::Finished });
                }
            }
        },
        err_fn,
        None,
    )?;

    stream.play().context("Failed to start playback stream")?;

    info!("Speaker output: {} Hz, {} channel(s)", sample_rate, channels);

    Ok(Output { _stream: stream, sample_rate, channels, producer })
}

impl PlaybackSink for SpeakerSink {
    fn is_connected(&self) -> bool {
        if !self.signals.connected.load(Ordering::SeqCst) {
            self.try_reopen();
        }
        self.signals.connected.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.signals.playing.load(Ordering::SeqCst)
    }

    fn play(&self, clip: AudioClip) -> Result<Playback, SinkError> {
        if !self.signals.connected.load(Ordering::SeqCst) {
            return Err(SinkError::Disconnected);
        }

        let (done, playback) = Playback::channel();

        {
            let mut output = self.output.lock();
            let samples = Self::device_samples(clip, output.sample_rate, output.channels)?;
            let written = output.producer.push_slice(&samples);
            if written < samples.len() {
                warn!("Playback buffer overflow, dropped {} samples", samples.len() - written);
            }
            debug!("Queued {} samples at {} Hz", samples.len(), output.sample_rate);
        }

        // Replacing an unfinished signal resolves it as stopped
        *self.signals.pending_done.lock() = Some(done);
        self.signals.playing.store(true, Ordering::SeqCst);

        Ok(playback)
    }

    fn stop(&self) {
        self.signals.interrupt.store(true, Ordering::SeqCst);
        self.signals.playing.store(false, Ordering::SeqCst);
        if let Some(done) = self.signals.pending_done.lock().take() {
            done.complete(PlaybackEnd::Stopped);
        }
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        self.stop();
    }
}
