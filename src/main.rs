//! Voice Reader - reads chat messages aloud with a distinct voice per speaker.
//!
//! Messages arrive as lines on stdin, are synthesized concurrently (one task per
//! phrase) and played back strictly in arrival order, with system announcements
//! jumping ahead of queued chat.

mod audio;
mod config;
mod source;
mod speech;
mod tts;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use audio::{PlaybackSink, WavSink};
use config::{AppConfig, Backend, SinkKind};
use source::MessageSource;
use speech::{Dispatcher, Intake, PlaybackScheduler, PlaybackSummary, SpeechRequest, UrlAbbreviator, VoiceRegistry};
use tts::{CommandSynthesizer, PhraseSynthesizer};

/// How long blocked tasks (stdin reader) may hold up runtime shutdown.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Create the configured synthesis backend.
fn build_synthesizer(config: &AppConfig) -> Result<Arc<dyn PhraseSynthesizer>> {
    match config.backend {
        Backend::Command => Ok(Arc::new(CommandSynthesizer::new(config))),
        Backend::Kokoro => build_kokoro(config),
    }
}

#[cfg(feature = "kokoro")]
fn build_kokoro(config: &AppConfig) -> Result<Arc<dyn PhraseSynthesizer>> {
    Ok(Arc::new(tts::KokoroSynthesizer::new(config)?))
}

#[cfg(not(feature = "kokoro"))]
fn build_kokoro(_config: &AppConfig) -> Result<Arc<dyn PhraseSynthesizer>> {
    anyhow::bail!("Kokoro backend is not available, rebuild with `--features kokoro`")
}

/// Create the configured playback sink.
fn build_sink(config: &AppConfig) -> Result<Arc<dyn PlaybackSink>> {
    match config.sink {
        SinkKind::Wav => {
            let sink = WavSink::new(&config.spool_dir)
                .with_context(|| format!("Failed to open spool directory {}", config.spool_dir.display()))?;
            Ok(Arc::new(sink))
        }
        SinkKind::Speaker => build_speaker(config),
    }
}

#[cfg(feature = "speaker")]
fn build_speaker(config: &AppConfig) -> Result<Arc<dyn PlaybackSink>> {
    Ok(Arc::new(audio::SpeakerSink::new(config.sample_rate)?))
}

#[cfg(not(feature = "speaker"))]
fn build_speaker(_config: &AppConfig) -> Result<Arc<dyn PlaybackSink>> {
    anyhow::bail!("Speaker output is not available, rebuild with `--features speaker`")
}

/// Queue a system announcement unless its text is empty.
fn announce(intake: &Intake, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    if let Err(e) = intake.enqueue(SpeechRequest::system(text)) {
        debug!("Announcement not queued: {}", e);
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
    }
}

/// Wait for the pipeline to play out, optionally bounded by a grace period
/// after which everything still pending is cancelled.
async fn finish_pipeline(
    dispatcher: JoinHandle<()>,
    scheduler: JoinHandle<PlaybackSummary>,
    cancel: &CancellationToken,
    grace: Option<Duration>,
) -> PlaybackSummary {
    let pipeline = async {
        if let Err(e) = dispatcher.await {
            debug!("Dispatcher task ended abnormally: {}", e);
        }
        match scheduler.await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Playback task failed: {}", e);
                PlaybackSummary::default()
            }
        }
    };
    tokio::pin!(pipeline);

    if let Some(grace) = grace {
        if let Ok(summary) = tokio::time::timeout(grace, &mut pipeline).await {
            return summary;
        }
        warn!("Shutdown grace period of {:?} elapsed, cancelling pending speech", grace);
        cancel.cancel();
    }

    pipeline.await
}

async fn run(config: AppConfig) -> Result<()> {
    let reader_config = config.reader_config()?;

    let synthesizer = build_synthesizer(&config)?;
    let sink = build_sink(&config)?;

    info!("Starting voice reader...");
    config.log_config();

    let intake = Intake::new();
    let registry = Arc::new(VoiceRegistry::new(&reader_config));
    let normalizer = Arc::new(UrlAbbreviator::new(config.url_placeholder.clone()));
    let cancel = CancellationToken::new();

    // Dispatcher -> scheduler channel; closes when the dispatcher is done
    let (bundle_tx, bundle_rx) = mpsc::unbounded_channel();

    let dispatcher = Dispatcher::new(intake.clone(), registry, synthesizer, normalizer, &reader_config);
    let dispatcher_handle = tokio::spawn(dispatcher.run(bundle_tx, cancel.clone()));

    let scheduler = PlaybackScheduler::new(sink, &reader_config);
    let scheduler_handle = tokio::spawn(scheduler.run(bundle_rx, cancel.clone()));

    announce(&intake, &config.announcements.voice_hello);

    let source = MessageSource::new(BufReader::new(tokio::io::stdin()), config.ignore_prefix.clone(), config.announcements.clone());
    let source_intake = intake.clone();
    let mut source_handle = tokio::spawn(async move { source.forward(&source_intake).await });

    info!("📖 Reading messages from stdin (Ctrl+C to stop)");

    // End of input plays out everything queued; a signal only waits for the grace period
    let grace = tokio::select! {
        _ = wait_for_shutdown() => Some(config.shutdown_grace()),
        result = &mut source_handle => {
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Stopped reading input: {}", e),
                Err(e) => warn!("Input task failed: {}", e),
            }
            None
        }
    };

    announce(&intake, &config.announcements.voice_goodbye);
    intake.close();
    source_handle.abort();

    if intake.pending() > 0 {
        info!("Finishing {} queued message(s)...", intake.pending());
    }
    let summary = finish_pipeline(dispatcher_handle, scheduler_handle, &cancel, grace).await;

    info!(
        "✅ Voice reader stopped ({} played, {} silent, {} dropped, {} aborted)",
        summary.played, summary.silent, summary.dropped, summary.aborted
    );
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments, env and config file
    let config = AppConfig::from_args()?;

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if config.verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("🗣️  Voice Reader v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(run(config));
    // stdin is read on a blocking thread that may never return
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}
