//! Configuration module for the voice reader.
//!
//! Provides CLI argument parsing and the settings injected into the speech pipeline.

#[allow(clippy::module_inception)]
mod config;
pub mod voices;

pub use config::{AppConfig, Announcements, Backend, ReaderConfig, SinkKind, SynthesisParams};
