//! Audio containers, resampling and playback sinks.
//!
//! The speaker sink (cpal) is only built with the `speaker` feature.

mod clip;
#[cfg(feature = "speaker")]
mod playback;
pub mod resampler;
mod sink;
#[cfg(feature = "speaker")]
pub mod util;
mod wav_sink;

pub use clip::AudioClip;
#[cfg(feature = "speaker")]
pub use playback::SpeakerSink;
pub use sink::{Playback, PlaybackSink, SinkError};
#[cfg(test)]
pub use sink::{PlaybackDone, PlaybackEnd};
pub use wav_sink::WavSink;
