//! cpal device helpers for the speaker sink.

use anyhow::Result;
use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

/// Get a human-readable device name, or "Unknown".
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Pick an F32 mono/stereo output configuration, preferring stereo and the target rate.
///
/// Falls back to the closest supported rate of the first usable configuration.
pub fn find_best_config(configs: impl Iterator<Item = SupportedStreamConfigRange>, target_sample_rate: u32) -> Result<SupportedStreamConfig> {
    let mut f32_configs: Vec<SupportedStreamConfigRange> =
        configs.filter(|config| config.channels() <= 2 && config.sample_format() == SampleFormat::F32).collect();

    if f32_configs.is_empty() {
        anyhow::bail!("No F32 audio configuration found - this is unexpected on modern hardware");
    }

    // Voice output is stereo; try those first
    f32_configs.sort_by_key(|config| std::cmp::Reverse(config.channels()));

    if let Some(config) = f32_configs
        .iter()
        .find(|config| (config.min_sample_rate()..=config.max_sample_rate()).contains(&target_sample_rate))
    {
        return Ok((*config).with_sample_rate(target_sample_rate));
    }

    let config = &f32_configs[0];
    let rate = target_sample_rate.clamp(config.min_sample_rate(), config.max_sample_rate());
    Ok((*config).with_sample_rate(rate))
}
