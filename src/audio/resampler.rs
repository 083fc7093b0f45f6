//! Batch audio resampling using the rubato FFT resampler.
//!
//! Synthesizers produce audio at their native rate (24 kHz for Kokoro, whatever
//! the external tool was asked for otherwise); sinks want one fixed rate.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

/// Chunk size in frames for FFT-based resampling.
const CHUNK_SIZE: usize = 1024;

/// Number of sub-chunks for FFT processing (higher = better quality but more CPU).
const SUB_CHUNKS: usize = 2;

/// Resample interleaved audio from one sample rate to another.
///
/// # Arguments
/// * `samples` - Interleaved input samples
/// * `channels` - Number of interleaved channels
/// * `from_rate` - Input sample rate (e.g., 24000 for Kokoro)
/// * `to_rate` - Output sample rate (e.g., 48000 for the voice sink)
///
/// # Returns
/// Interleaved samples at the target rate with the same channel count.
pub fn resample(samples: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let channels = channels.max(1);

    let mut resampler = Fft::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, channels, FixedSync::Input)
        .context("Failed to create resampler")?;

    let output_frames_max = resampler.output_frames_max();
    let mut output_buffer = vec![0.0f32; output_frames_max * channels];

    let input_frames = samples.len() / channels;
    let expected_frames = (input_frames as f64 * to_rate as f64 / from_rate as f64) as usize;
    let mut output = Vec::with_capacity((expected_frames + CHUNK_SIZE) * channels);

    let chunk_len = CHUNK_SIZE * channels;
    let mut input_chunk = vec![0.0f32; chunk_len];

    for chunk in samples.chunks(chunk_len) {
        // Last chunk is zero padded
        input_chunk[..chunk.len()].copy_from_slice(chunk);
        input_chunk[chunk.len()..].fill(0.0);

        let input_adapter = InterleavedSlice::new(&input_chunk, channels, CHUNK_SIZE).context("Failed to create input adapter")?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut output_buffer, channels, output_frames_max).context("Failed to create output adapter")?;

        let (_, frames_written) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, None)
            .map_err(|e| anyhow::anyhow!("Resampling error: {}", e))?;
        output.extend_from_slice(&output_buffer[..frames_written * channels]);
    }

    // Drop the padding tail, keeping whole frames
    output.truncate((expected_frames + 100) * channels);

    Ok(output)
}
