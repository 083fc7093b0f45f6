//! Speaker to voice assignment.
//!
//! Each new speaker takes the next voice from a shuffled copy of the pool.
//! When the copy runs out the full pool is reshuffled, so voices start being
//! shared instead of failing. Once a speaker has a voice it keeps it.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::ReaderConfig;

/// Synthesis voice selector (a Kokoro voice name, an htsvoice name or path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(String);

impl VoiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VoiceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Ordering applied to the pool each time it is refilled.
pub trait Shuffle: Send + Sync {
    fn shuffle(&self, voices: &mut [VoiceId]);
}

/// Uniform random order from the thread-local RNG.
pub struct RandomShuffle;

impl Shuffle for RandomShuffle {
    fn shuffle(&self, voices: &mut [VoiceId]) {
        voices.shuffle(&mut rand::rng());
    }
}

#[derive(Default)]
struct Assignments {
    by_speaker: HashMap<String, VoiceId>,
    remaining: VecDeque<VoiceId>,
    refills: u64,
}

/// Process-wide speaker to voice map. Cheap to read once warmed up.
pub struct VoiceRegistry {
    pool: Vec<VoiceId>,
    system_voice: VoiceId,
    shuffle: Box<dyn Shuffle>,
    state: RwLock<Assignments>,
}

impl VoiceRegistry {
    pub fn new(config: &ReaderConfig) -> Self {
        Self::with_shuffle(config, Box::new(RandomShuffle))
    }

    /// Build with a specific pool ordering (fixed permutations in tests).
    ///
    /// The default voice and duplicate entries are removed from the pool.
    pub fn with_shuffle(config: &ReaderConfig, shuffle: Box<dyn Shuffle>) -> Self {
        let system_voice = VoiceId::new(config.default_voice.clone());

        let mut pool: Vec<VoiceId> = Vec::with_capacity(config.voice_pool.len());
        for voice in config.voice_pool.iter().map(VoiceId::new) {
            if voice != system_voice && !pool.contains(&voice) {
                pool.push(voice);
            }
        }

        debug!("Voice pool: {} voice(s), system voice {}", pool.len(), system_voice);
        Self { pool, system_voice, shuffle, state: RwLock::new(Assignments::default()) }
    }

    /// Voice used for system announcements.
    pub fn system_voice(&self) -> &VoiceId {
        &self.system_voice
    }

    /// Voice already assigned to `speaker_id`, if any.
    pub fn lookup(&self, speaker_id: &str) -> Option<VoiceId> {
        self.state.read().by_speaker.get(speaker_id).cloned()
    }

    /// Voice for `speaker_id`, assigning one on first use.
    pub fn assign(&self, speaker_id: &str) -> VoiceId {
        if let Some(voice) = self.lookup(speaker_id) {
            return voice;
        }

        let mut state = self.state.write();
        // Another task may have assigned it between the two locks
        if let Some(voice) = state.by_speaker.get(speaker_id) {
            return voice.clone();
        }

        if self.pool.is_empty() {
            return self.system_voice.clone();
        }

        if state.remaining.is_empty() {
            let mut fresh = self.pool.clone();
            self.shuffle.shuffle(&mut fresh);
            if state.refills > 0 {
                info!("🔀 Voice pool exhausted, reshuffling {} voice(s)", fresh.len());
            }
            state.refills += 1;
            state.remaining = fresh.into();
        }

        let voice = state.remaining.pop_front().unwrap_or_else(|| self.system_voice.clone());
        info!("🎙️  Assigned voice {} to {}", voice, speaker_id);
        state.by_speaker.insert(speaker_id.to_string(), voice.clone());
        voice
    }
}
