//! PCM audio container passed from synthesizers to playback sinks.

use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::resampler::resample;

/// Interleaved f32 audio at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioClip {
    /// Create a single-channel clip.
    #[cfg_attr(not(any(test, feature = "kokoro")), allow(dead_code))]
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self { sample_rate, channels: 1, samples }
    }

    /// Decode a RIFF/WAV byte buffer (integer or float PCM).
    pub fn from_wav_bytes(bytes: &[u8]) -> hound::Result<Self> {
        let reader = WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            SampleFormat::Float => reader.into_samples::<f32>().collect::<hound::Result<Vec<_>>>()?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader.into_samples::<i32>().map(|s| s.map(|v| v as f32 / scale)).collect::<hound::Result<Vec<_>>>()?
            }
        };

        Ok(Self { sample_rate: spec.sample_rate, channels: spec.channels.max(1), samples })
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length of the clip.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Expand to two channels.
    ///
    /// Mono frames are duplicated to left/right; clips with more than two
    /// channels keep their first two.
    pub fn into_stereo(self) -> Self {
        let samples = match self.channels {
            2 => return self,
            0 | 1 => self.samples.iter().flat_map(|&s| [s, s]).collect(),
            n => self.samples.chunks_exact(n as usize).flat_map(|frame| [frame[0], frame[1]]).collect(),
        };
        Self { sample_rate: self.sample_rate, channels: 2, samples }
    }

    /// Mix all channels down to one by averaging each frame.
    #[cfg_attr(not(any(test, feature = "speaker")), allow(dead_code))]
    pub fn downmix(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            self.samples.clone()
        } else {
            self.samples.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
        }
    }

    /// Resample to `to_rate`, keeping the channel layout.
    pub fn resampled(self, to_rate: u32) -> Result<Self> {
        if self.sample_rate == to_rate {
            return Ok(self);
        }
        let samples = resample(&self.samples, self.channels as usize, self.sample_rate, to_rate)?;
        Ok(Self { sample_rate: to_rate, channels: self.channels, samples })
    }

    /// Encode as 16-bit PCM WAV into any seekable writer.
    pub fn encode_wav<W: Write + Seek>(&self, writer: W) -> hound::Result<()> {
        let spec = WavSpec { channels: self.channels, sample_rate: self.sample_rate, bits_per_sample: 16, sample_format: SampleFormat::Int };
        let mut wav = WavWriter::new(writer, spec)?;
        for &sample in &self.samples {
            wav.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        wav.finalize()
    }

    /// Write the clip to a WAV file.
    pub fn write_wav(&self, path: &Path) -> hound::Result<()> {
        let file = BufWriter::new(File::create(path)?);
        self.encode_wav(file)
    }
}
