//! Sink that spools every played clip to a numbered WAV file.
//!
//! Useful headless: another process can pick the files up in order and
//! stream them to wherever the voice actually goes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::sink::{Playback, PlaybackEnd, PlaybackSink, SinkError};
use super::AudioClip;

pub struct WavSink {
    dir: PathBuf,
    next_index: AtomicU64,
}

impl WavSink {
    /// Create the sink, creating `dir` if needed.
    ///
    /// Numbering continues after the highest-numbered file already in the directory.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create spool directory {}", dir.display()))?;

        let next_index = fs::read_dir(dir)
            .with_context(|| format!("Failed to read spool directory {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "wav") {
                    path.file_stem()?.to_str()?.parse::<u64>().ok()
                } else {
                    None
                }
            })
            .max()
            .map_or(0, |last| last + 1);

        info!("Spooling speech to {} (starting at #{})", dir.display(), next_index);
        Ok(Self { dir: dir.to_path_buf(), next_index: AtomicU64::new(next_index) })
    }
}

impl PlaybackSink for WavSink {
    fn is_connected(&self) -> bool {
        self.dir.is_dir()
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn play(&self, clip: AudioClip) -> Result<Playback, SinkError> {
        if !self.is_connected() {
            return Err(SinkError::Disconnected);
        }

        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("{index:08}.wav"));
        clip.write_wav(&path)?;

        debug!("Wrote {} ({:.2}s)", path.display(), clip.duration().as_secs_f32());
        Ok(Playback::ended(PlaybackEnd::Finished))
    }

    fn stop(&self) {}
}
