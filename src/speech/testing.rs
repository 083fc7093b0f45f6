//! Test doubles for the speech pipeline.
//!
//! Synthesized clips carry their phrase text as sample values, so the
//! recording sink can tell which phrase it was asked to play.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::registry::{Shuffle, VoiceId};
use crate::audio::{AudioClip, Playback, PlaybackDone, PlaybackEnd, PlaybackSink, SinkError};
use crate::tts::{PhraseSynthesizer, SynthesisError};

pub const TEST_SAMPLE_RATE: u32 = 16000;

/// Mono clip whose samples spell out `text`.
pub fn clip_for(text: &str) -> AudioClip {
    AudioClip::mono(TEST_SAMPLE_RATE, text.bytes().map(|b| b as f32 / 255.0).collect())
}

/// Recover the text from a clip built by [`clip_for`], whatever its channel count.
pub fn text_of(clip: &AudioClip) -> String {
    let channels = clip.channels.max(1) as usize;
    let bytes: Vec<u8> = clip.samples.iter().step_by(channels).map(|s| (s * 255.0).round() as u8).collect();
    String::from_utf8_lossy(&bytes).to_string()
}

/// Reorders the pool by a fixed index permutation.
pub struct FixedPermutation(pub Vec<usize>);

impl Shuffle for FixedPermutation {
    fn shuffle(&self, voices: &mut [VoiceId]) {
        let original = voices.to_vec();
        for (slot, &from) in self.0.iter().enumerate() {
            if slot < voices.len() && from < original.len() {
                voices[slot] = original[from].clone();
            }
        }
    }
}

#[derive(Clone, Copy, Default)]
struct Script {
    delay: Duration,
    fail: bool,
}

/// Synthesizer with per-phrase latency and failures.
#[derive(Default)]
pub struct ScriptedSynthesizer {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, VoiceId)>>,
}

impl ScriptedSynthesizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make synthesis of `text` take `delay`.
    pub fn delay(&self, text: &str, delay: Duration) {
        self.scripts.lock().entry(text.to_string()).or_default().delay = delay;
    }

    /// Make synthesis of `text` fail.
    pub fn fail(&self, text: &str) {
        self.scripts.lock().entry(text.to_string()).or_default().fail = true;
    }

    /// Every `(text, voice)` pair synthesis was attempted for.
    pub fn calls(&self) -> Vec<(String, VoiceId)> {
        self.calls.lock().clone()
    }

    pub fn voice_for(&self, text: &str) -> Option<VoiceId> {
        self.calls.lock().iter().find(|(t, _)| t == text).map(|(_, voice)| voice.clone())
    }
}

#[async_trait]
impl PhraseSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<AudioClip, SynthesisError> {
        self.calls.lock().push((text.to_string(), voice.clone()));
        let script = self.scripts.lock().get(text).copied().unwrap_or_default();

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        if script.fail {
            return Err(SynthesisError::Backend(format!("scripted failure for \"{}\"", text)));
        }
        Ok(clip_for(text))
    }
}

#[derive(Default)]
struct SinkState {
    connected: bool,
    playing: bool,
    generation: u64,
    current: Option<PlaybackDone>,
    started: Vec<(String, Instant)>,
    stops: usize,
}

/// Sink that "plays" each clip for a fixed time and records what it played.
#[derive(Clone)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
    play_time: Duration,
}

impl RecordingSink {
    pub fn new(play_time: Duration) -> Self {
        Self { state: Arc::new(Mutex::new(SinkState { connected: true, ..Default::default() })), play_time }
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Texts of the clips started, in order.
    pub fn played(&self) -> Vec<String> {
        self.state.lock().started.iter().map(|(text, _)| text.clone()).collect()
    }

    /// Start time of each clip, in order.
    pub fn started(&self) -> Vec<(String, Instant)> {
        self.state.lock().started.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }
}

impl PlaybackSink for RecordingSink {
    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn play(&self, clip: AudioClip) -> Result<Playback, SinkError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(SinkError::Disconnected);
        }
        assert!(!state.playing, "play called while another clip is playing");

        let (done, playback) = Playback::channel();
        state.generation += 1;
        state.playing = true;
        state.current = Some(done);
        state.started.push((text_of(&clip), Instant::now()));

        let generation = state.generation;
        let shared = self.state.clone();
        let play_time = self.play_time;
        tokio::spawn(async move {
            tokio::time::sleep(play_time).await;
            let mut state = shared.lock();
            if state.generation == generation {
                state.playing = false;
                if let Some(done) = state.current.take() {
                    done.complete(PlaybackEnd::Finished);
                }
            }
        });

        Ok(playback)
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.playing = false;
        state.stops += 1;
        if let Some(done) = state.current.take() {
            done.complete(PlaybackEnd::Stopped);
        }
    }
}
