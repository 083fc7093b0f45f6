//! Speech pipeline: intake, voice assignment, synthesis dispatch, ordering and playback.
//!
//! Requests flow `Intake` → `Dispatcher` → `OrderingBuffer` (inside the
//! `PlaybackScheduler`) → sink.

mod dispatcher;
mod intake;
mod normalize;
mod ordering;
mod registry;
mod request;
mod scheduler;
#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::Dispatcher;
pub use intake::Intake;
pub use normalize::UrlAbbreviator;
pub use registry::{VoiceId, VoiceRegistry};
pub use request::{SYSTEM_SPEAKER, SpeechRequest};
pub use scheduler::{PlaybackScheduler, PlaybackSummary};
