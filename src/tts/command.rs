//! External synthesis command backend (open_jtalk and compatible tools).
//!
//! Every phrase runs one process: the text goes in on stdin and the engine
//! writes a WAV file into a private temporary directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{PhraseSynthesizer, SynthesisError};
use crate::audio::AudioClip;
use crate::config::{AppConfig, SynthesisParams};
use crate::speech::VoiceId;

const WAVE_OUT: &str = "a.wav";

/// Runs the synthesis command once per phrase.
pub struct CommandSynthesizer {
    program: PathBuf,
    dictionary: PathBuf,
    voice_dir: PathBuf,
    sample_rate: Option<u32>,
    params: SynthesisParams,
}

impl CommandSynthesizer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            program: config.jtalk_bin.clone(),
            dictionary: config.jtalk_dict.clone(),
            voice_dir: config.voice_dir.clone(),
            sample_rate: Some(config.sample_rate),
            params: config.synthesis.clone(),
        }
    }

    /// Voice model file for `voice`.
    ///
    /// Plain names resolve to `<voice_dir>/<name>.htsvoice`; anything that looks
    /// like a path is used as is.
    pub fn voice_path(&self, voice: &VoiceId) -> PathBuf {
        let id = voice.as_str();
        if id.contains(std::path::MAIN_SEPARATOR) || id.contains('/') || id.ends_with(".htsvoice") {
            PathBuf::from(id)
        } else {
            self.voice_dir.join(format!("{}.htsvoice", id))
        }
    }

    /// Command line arguments for one run writing to `output`.
    pub fn build_args(&self, voice: &VoiceId, output: &Path) -> Vec<String> {
        let params = &self.params;
        let mut args = vec![
            "-x".to_string(),
            self.dictionary.to_string_lossy().to_string(),
            "-m".to_string(),
            self.voice_path(voice).to_string_lossy().to_string(),
            "-ow".to_string(),
            output.to_string_lossy().to_string(),
        ];

        let mut push = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        if let Some(rate) = self.sample_rate {
            push("-s", rate.to_string());
        }
        if let Some(frame_period) = params.frame_period {
            push("-p", frame_period.to_string());
        }
        if let Some(all_pass) = params.all_pass {
            push("-a", all_pass.to_string());
        }
        push("-b", params.postfilter.to_string());
        push("-r", params.speed.to_string());
        push("-fm", params.half_tone.to_string());
        push("-u", params.threshold.to_string());
        push("-jm", params.spectrum_weight.to_string());
        push("-jf", params.log_f0_weight.to_string());
        push("-g", params.volume_db.to_string());
        push("-z", params.buffer_size.to_string());

        args
    }
}

#[async_trait]
impl PhraseSynthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str, voice: &VoiceId) -> Result<AudioClip, SynthesisError> {
        let workdir = tempfile::tempdir().map_err(SynthesisError::Spawn)?;
        let output = workdir.path().join(WAVE_OUT);

        debug!("Running {} for \"{}\" with voice {}", self.program.display(), text, voice);

        let mut child = Command::new(&self.program)
            .args(self.build_args(voice, &output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SynthesisError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            // An engine that exits early closes the pipe; its exit status tells what happened
            if let Err(e) = stdin.write_all(text.as_bytes()).await
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(SynthesisError::Spawn(e));
            }
            drop(stdin);
        }

        let result = child.wait_with_output().await.map_err(SynthesisError::Spawn)?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            return Err(SynthesisError::Exit { status: result.status, stderr });
        }

        let bytes = match tokio::fs::read(&output).await {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return Err(SynthesisError::Empty),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(SynthesisError::Empty),
            Err(e) => return Err(SynthesisError::Backend(format!("failed to read {}: {}", output.display(), e))),
        };

        let clip = AudioClip::from_wav_bytes(&bytes)?;
        if clip.is_empty() {
            return Err(SynthesisError::Empty);
        }
        Ok(clip)
    }
}
