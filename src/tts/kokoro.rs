//! In-process Kokoro synthesis through sherpa-rs.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{CommonTtsConfig, KokoroTts, KokoroTtsConfig};
use tracing::{debug, info};

use super::{PhraseSynthesizer, SynthesisError};
use crate::audio::AudioClip;
use crate::config::{AppConfig, voices};
use crate::speech::VoiceId;

/// Kokoro always produces 24 kHz mono.
const KOKORO_SAMPLE_RATE: u32 = 24000;

/// Kokoro engine shared by all phrase tasks.
///
/// The engine is not reentrant, so calls are serialized on a blocking thread.
pub struct KokoroSynthesizer {
    tts: Arc<Mutex<KokoroTts>>,
    speed: f32,
}

impl KokoroSynthesizer {
    /// Load the multi-language Kokoro model.
    ///
    /// # Errors
    /// Returns an error if a model file is missing.
    pub fn new(config: &AppConfig) -> Result<Self> {
        for path in [config.tts_model_path(), config.tts_voices_path(), config.tts_tokens_path()] {
            if !path.exists() {
                anyhow::bail!("Kokoro model file not found: {}", path.display());
            }
        }

        info!("Initializing Kokoro TTS synthesizer ({} threads)", config.tts_threads);

        let tts_config = KokoroTtsConfig {
            model: config.tts_model_path().to_string_lossy().to_string(),
            voices: config.tts_voices_path().to_string_lossy().to_string(),
            tokens: config.tts_tokens_path().to_string_lossy().to_string(),
            data_dir: config.tts_data_dir().to_string_lossy().to_string(),
            dict_dir: config.tts_dict_dir().to_string_lossy().to_string(),
            lexicon: config.tts_lexicon(),
            lang: espeak_language(&config.effective_default_voice()).to_string(), // For voices without lexicon
            length_scale: 1.0 / config.synthesis.speed, // length_scale is inverse of speed
            onnx_config: OnnxConfig {
                provider: "cpu".to_string(),
                num_threads: config.tts_threads.try_into().unwrap_or(2),
                debug: config.verbose,
            },
            common_config: CommonTtsConfig { max_num_sentences: 1, ..Default::default() }, // Kokoro only supports 1
        };

        let tts = KokoroTts::new(tts_config);
        info!("TTS sample rate: {} Hz", KOKORO_SAMPLE_RATE);

        Ok(Self { tts: Arc::new(Mutex::new(tts)), speed: config.synthesis.speed })
    }
}

/// espeak-ng language for voices not covered by a lexicon file.
fn espeak_language(voice: &str) -> &'static str {
    match voices::get_voice(voice) {
        Some(v) if v.espeak_code.starts_with("en") || v.espeak_code == "cmn" => "",
        Some(v) => v.espeak_code,
        None => "",
    }
}

#[async_trait]
impl PhraseSynthesizer for KokoroSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<AudioClip, SynthesisError> {
        let speaker_id = voices::get_voice(voice.as_str()).ok_or_else(|| SynthesisError::UnknownVoice(voice.clone()))?.speaker_id;

        debug!("Synthesizing \"{}\" with {} (speaker ID {})", text, voice, speaker_id);

        let tts = self.tts.clone();
        let text = text.to_string();
        let speed = self.speed;
        let samples = tokio::task::spawn_blocking(move || {
            tts.lock()
                .create(&text, speaker_id, speed)
                .map(|audio| audio.samples)
                .map_err(|e| SynthesisError::Backend(format!("TTS generation failed: {}", e)))
        })
        .await
        .map_err(|e| SynthesisError::Backend(format!("TTS task failed: {}", e)))??;

        if samples.is_empty() {
            return Err(SynthesisError::Empty);
        }
        Ok(AudioClip::mono(KOKORO_SAMPLE_RATE, samples))
    }
}
