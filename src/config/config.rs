//! Application configuration and CLI argument parsing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::voices;

/// Voices bundled with MMDAgent / hts_voice packages, used when `--voices` is not given.
const JTALK_VOICES: &[&str] = &["mei_normal", "mei_happy", "mei_bashful", "mei_angry", "mei_sad", "nitech_jp_atr503_m001"];

/// Name of the JSON config file looked up when `--config` is not given.
const CONFIG_FILE_NAME: &str = "voice-reader.json";

/// Upper bound for every timing option, in seconds.
const MAX_SECONDS: f64 = 86_400.0;

/// Speech synthesis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// External open_jtalk-compatible command (one process per phrase)
    #[default]
    Command,
    /// In-process Kokoro via sherpa-rs (requires the `kokoro` feature)
    Kokoro,
}

/// Where synthesized speech is played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Write numbered WAV files into the spool directory
    #[default]
    Wav,
    /// Default audio output device (requires the `speaker` feature)
    Speaker,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Command => write!(f, "command"),
            Backend::Kokoro => write!(f, "kokoro"),
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::Wav => write!(f, "wav"),
            SinkKind::Speaker => write!(f, "speaker"),
        }
    }
}

/// Acoustic parameters passed to the synthesis engine.
///
/// Fixed at startup and validated once; backends ignore what they cannot express.
#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    /// Speech speed rate
    #[arg(long, default_value = "1.0")]
    pub speed: f32,

    /// Frame period in points (engine default if omitted)
    #[arg(long)]
    pub frame_period: Option<u32>,

    /// All-pass constant 0.0-1.0 (engine default if omitted)
    #[arg(long)]
    pub all_pass: Option<f32>,

    /// Postfiltering coefficient (0.0-1.0)
    #[arg(long, default_value = "0.0")]
    pub postfilter: f32,

    /// Additional half-tone
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub half_tone: f32,

    /// Voiced/unvoiced threshold (0.0-1.0)
    #[arg(long, default_value = "0.5")]
    pub threshold: f32,

    /// Weight of GV for spectrum
    #[arg(long, default_value = "1.0")]
    pub spectrum_weight: f32,

    /// Weight of GV for log F0
    #[arg(long, default_value = "1.0")]
    pub log_f0_weight: f32,

    /// Volume in dB
    #[arg(long, default_value = "0.0")]
    pub volume_db: f32,

    /// Audio buffer size (0 turns it off)
    #[arg(long, default_value = "0")]
    pub buffer_size: u32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            speed: 1.0,
            frame_period: None,
            all_pass: None,
            postfilter: 0.0,
            half_tone: 0.0,
            threshold: 0.5,
            spectrum_weight: 1.0,
            log_f0_weight: 1.0,
            volume_db: 0.0,
            buffer_size: 0,
        }
    }
}

impl SynthesisParams {
    pub fn validate(&self) -> Result<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            anyhow::bail!("Speed must be positive, got {}", self.speed);
        }
        if self.frame_period == Some(0) {
            anyhow::bail!("Frame period must be >= 1");
        }
        if let Some(all_pass) = self.all_pass
            && !(0.0..=1.0).contains(&all_pass)
        {
            anyhow::bail!("All-pass constant must be between 0.0 and 1.0, got {}", all_pass);
        }
        if !(0.0..=1.0).contains(&self.postfilter) {
            anyhow::bail!("Postfilter coefficient must be between 0.0 and 1.0, got {}", self.postfilter);
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            anyhow::bail!("Voiced/unvoiced threshold must be between 0.0 and 1.0, got {}", self.threshold);
        }
        if !self.half_tone.is_finite() {
            anyhow::bail!("Half-tone must be a number, got {}", self.half_tone);
        }
        if [self.spectrum_weight, self.log_f0_weight].iter().any(|w| !w.is_finite() || *w < 0.0) {
            anyhow::bail!("GV weights must be >= 0.0");
        }
        if !self.volume_db.is_finite() || self.volume_db < 0.0 {
            anyhow::bail!("Volume must be >= 0.0 dB, got {}", self.volume_db);
        }
        Ok(())
    }
}

/// Texts spoken for system events. `{name}` is replaced by the member name.
#[derive(Args, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcements {
    /// Spoken when the reader starts
    #[arg(long, env = "VOICE_READER_HELLO", default_value = "Reading the chat aloud from now on.")]
    pub voice_hello: String,

    /// Spoken when the reader shuts down
    #[arg(long, env = "VOICE_READER_GOODBYE", default_value = "Stopping the reader. Goodbye.")]
    pub voice_goodbye: String,

    /// Spoken when a member joins the voice channel
    #[arg(long, default_value = "{name} joined.")]
    pub voice_join: String,

    /// Spoken when a member leaves the voice channel
    #[arg(long, default_value = "{name} left.")]
    pub voice_leave: String,
}

impl Default for Announcements {
    fn default() -> Self {
        Self {
            voice_hello: "Reading the chat aloud from now on.".to_string(),
            voice_goodbye: "Stopping the reader. Goodbye.".to_string(),
            voice_join: "{name} joined.".to_string(),
            voice_leave: "{name} left.".to_string(),
        }
    }
}

impl Announcements {
    pub fn joined(&self, name: &str) -> String {
        self.voice_join.replace("{name}", name)
    }

    pub fn left(&self, name: &str) -> String {
        self.voice_leave.replace("{name}", name)
    }
}

/// Voice reader application configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "voice-reader")]
#[command(author, version, about = "Reads chat messages aloud with a voice per speaker", long_about = None)]
pub struct AppConfig {
    /// JSON config file (searched in ., ~, ~/.local and next to the executable if omitted)
    #[arg(long, env = "VOICE_READER_CONFIG")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// List all Kokoro voices and exit
    #[arg(long)]
    pub list_voices: bool,

    /// Speech synthesis backend
    #[arg(long, value_enum, env = "VOICE_READER_BACKEND", default_value = "command")]
    pub backend: Backend,

    /// Playback sink
    #[arg(long, value_enum, env = "VOICE_READER_SINK", default_value = "wav")]
    pub sink: SinkKind,

    /// Voice pool assigned to speakers, comma separated (backend default if empty)
    #[arg(long, env = "VOICE_READER_VOICES", value_delimiter = ',')]
    pub voices: Vec<String>,

    /// Voice for system announcements (never handed out to speakers)
    #[arg(long, env = "VOICE_READER_DEFAULT_VOICE")]
    pub default_voice: Option<String>,

    /// Seconds to wait for the sink to connect before dropping a message
    #[arg(long, default_value = "6.0")]
    pub connect_timeout: f64,

    /// Seconds between sink state checks
    #[arg(long, default_value = "0.1")]
    pub poll_interval: f64,

    /// Seconds before a single phrase synthesis is abandoned
    #[arg(long, default_value = "10.0")]
    pub synthesis_timeout: f64,

    /// Maximum phrases synthesized at once (0 = number of CPU cores)
    #[arg(long, default_value = "0")]
    pub max_concurrent_synthesis: usize,

    /// Output sample rate handed to the sink
    #[arg(long, default_value = "48000")]
    pub sample_rate: u32,

    /// Directory for the wav sink
    #[arg(long, env = "VOICE_READER_SPOOL_DIR", default_value_os_t = default_data_dir().join("spool"))]
    pub spool_dir: PathBuf,

    /// Messages starting with this prefix are bot commands and are not read (empty disables)
    #[arg(long, default_value = "!")]
    pub ignore_prefix: String,

    /// Word spoken in place of URLs
    #[arg(long, default_value = "URL")]
    pub url_placeholder: String,

    /// Milliseconds to keep draining queued speech after Ctrl+C/SIGTERM
    #[arg(long, default_value = "3000")]
    pub shutdown_grace_ms: u64,

    /// open_jtalk-compatible executable for the command backend
    #[arg(long, env = "VOICE_READER_JTALK", default_value = "open_jtalk")]
    pub jtalk_bin: PathBuf,

    /// Dictionary directory passed to the command backend
    #[arg(long, env = "VOICE_READER_JTALK_DICT", default_value = "/var/lib/mecab/dic/open-jtalk/naist-jdic")]
    pub jtalk_dict: PathBuf,

    /// Directory holding <voice>.htsvoice files for the command backend
    #[arg(long, env = "VOICE_READER_VOICE_DIR", default_value_os_t = default_data_dir().join("voices"))]
    pub voice_dir: PathBuf,

    /// Directory containing Kokoro model files
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_data_dir().join("models"))]
    pub model_dir: PathBuf,

    /// Kokoro inference threads (0 = auto-detect)
    #[arg(long, default_value = "0")]
    pub tts_threads: usize,

    #[command(flatten)]
    #[serde(flatten)]
    pub synthesis: SynthesisParams,

    #[command(flatten)]
    #[serde(flatten)]
    pub announcements: Announcements,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

/// Settings the speech pipeline is built from.
///
/// Constructed once from [`AppConfig`] and handed to the registry, dispatcher and scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub voice_pool: Vec<String>,
    pub default_voice: String,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub synthesis_timeout: Duration,
    pub max_concurrent_synthesis: usize,
    pub output_sample_rate: u32,
}

impl ReaderConfig {
    /// Pipeline settings with the CLI defaults for everything but the voices.
    #[cfg(test)]
    pub fn new(voice_pool: Vec<String>, default_voice: impl Into<String>) -> Self {
        Self {
            voice_pool,
            default_voice: default_voice.into(),
            connect_timeout: Duration::from_secs(6),
            poll_interval: Duration::from_millis(100),
            synthesis_timeout: Duration::from_secs(10),
            max_concurrent_synthesis: 4,
            output_sample_rate: 48000,
        }
    }
}

impl AppConfig {
    /// Parse configuration from command line arguments, env and the config file.
    ///
    /// Precedence, highest first: command line, environment, config file, built-in defaults.
    pub fn from_args() -> Result<Self> {
        let matches = Self::command().get_matches();
        let mut config = Self::from_matches(&matches, &config_search_paths())?;

        if config.list_voices {
            voices::print_voices();
            std::process::exit(0);
        }

        config.normalize();
        Ok(config)
    }

    /// Build the configuration from parsed arguments, layering the first config
    /// file found (the explicit `--config`, else the first of `search_paths`)
    /// beneath anything given on the command line or in the environment.
    fn from_matches(matches: &ArgMatches, search_paths: &[PathBuf]) -> Result<Self> {
        let config = Self::from_arg_matches(matches)?;

        let path = match &config.config {
            Some(path) => path.clone(),
            None => match search_paths.iter().find(|path| path.is_file()) {
                Some(path) => path.clone(),
                None => return Ok(config),
            },
        };

        let mut config = config.with_file(&path, matches)?;
        config.config = Some(path);
        Ok(config)
    }

    /// Overlay values from a JSON config file onto options left at their defaults.
    fn with_file(self, path: &Path, matches: &ArgMatches) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let file: Map<String, Value> =
            serde_json::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))?;

        let mut merged = serde_json::to_value(&self).context("Failed to serialize configuration")?;
        let Value::Object(fields) = &mut merged else {
            anyhow::bail!("Configuration is not a JSON object");
        };

        for (key, value) in file {
            if !fields.contains_key(&key) {
                anyhow::bail!("Unknown option '{}' in config file {}", key, path.display());
            }
            let explicit = matches!(matches.value_source(&key), Some(ValueSource::CommandLine | ValueSource::EnvVariable));
            if !explicit {
                fields.insert(key, value);
            }
        }

        serde_json::from_value(merged).with_context(|| format!("Invalid value in config file {}", path.display()))
    }

    /// Resolve auto-detected counts.
    fn normalize(&mut self) {
        let cpu_cores = num_cpus::get();
        if self.max_concurrent_synthesis == 0 {
            self.max_concurrent_synthesis = cpu_cores.max(1);
        }
        if self.tts_threads == 0 {
            self.tts_threads = (cpu_cores / 3).max(1);
        }
        self.voices.retain(|voice| !voice.trim().is_empty());
    }

    /// Voice pool, falling back to the backend's bundled voices.
    pub fn effective_voice_pool(&self) -> Vec<String> {
        if !self.voices.is_empty() {
            return self.voices.iter().map(|voice| voice.trim().to_string()).collect();
        }
        match self.backend {
            Backend::Command => JTALK_VOICES.iter().map(|voice| voice.to_string()).collect(),
            Backend::Kokoro => voices::names().map(str::to_string).collect(),
        }
    }

    /// Announcement voice, falling back to the backend default.
    pub fn effective_default_voice(&self) -> String {
        match (&self.default_voice, self.backend) {
            (Some(voice), _) => voice.clone(),
            (None, Backend::Command) => "mei_normal".to_string(),
            (None, Backend::Kokoro) => "af_bella".to_string(),
        }
    }

    /// Build the pipeline settings.
    pub fn reader_config(&self) -> Result<ReaderConfig> {
        Ok(ReaderConfig {
            voice_pool: self.effective_voice_pool(),
            default_voice: self.effective_default_voice(),
            connect_timeout: seconds("Connect timeout", self.connect_timeout)?,
            poll_interval: seconds("Poll interval", self.poll_interval)?,
            synthesis_timeout: seconds("Synthesis timeout", self.synthesis_timeout)?,
            max_concurrent_synthesis: self.max_concurrent_synthesis.max(1),
            output_sample_rate: self.sample_rate,
        })
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Path to the Kokoro model directory (multi-lang v1.0).
    #[cfg(feature = "kokoro")]
    fn kokoro_dir(&self) -> PathBuf {
        self.model_dir.join("tts").join("kokoro-multi-lang-v1_0")
    }

    #[cfg(feature = "kokoro")]
    pub fn tts_model_path(&self) -> PathBuf {
        self.kokoro_dir().join("model.onnx")
    }

    #[cfg(feature = "kokoro")]
    pub fn tts_voices_path(&self) -> PathBuf {
        self.kokoro_dir().join("voices.bin")
    }

    #[cfg(feature = "kokoro")]
    pub fn tts_tokens_path(&self) -> PathBuf {
        self.kokoro_dir().join("tokens.txt")
    }

    #[cfg(feature = "kokoro")]
    pub fn tts_data_dir(&self) -> PathBuf {
        self.kokoro_dir().join("espeak-ng-data")
    }

    #[cfg(feature = "kokoro")]
    pub fn tts_dict_dir(&self) -> PathBuf {
        self.kokoro_dir().join("dict")
    }

    /// Lexicon files covering every voice in the pool.
    ///
    /// English and Chinese voices use lexicons; other languages go through espeak-ng.
    #[cfg(feature = "kokoro")]
    pub fn tts_lexicon(&self) -> String {
        let dir = self.kokoro_dir();
        let mut lexicons: Vec<&str> = Vec::new();
        for voice in self.effective_voice_pool().iter().chain(std::iter::once(&self.effective_default_voice())) {
            let files: &[&str] = match voice.get(..2) {
                Some("af" | "am") => &["lexicon-us-en.txt"],
                Some("bf" | "bm") => &["lexicon-gb-en.txt"],
                Some("zf" | "zm") => &["lexicon-us-en.txt", "lexicon-zh.txt"],
                _ => &[],
            };
            for &file in files {
                if !lexicons.contains(&file) {
                    lexicons.push(file);
                }
            }
        }
        lexicons.iter().map(|file| dir.join(file).to_string_lossy().to_string()).collect::<Vec<_>>().join(",")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let reader = self.reader_config()?;
        if reader.poll_interval > reader.connect_timeout {
            anyhow::bail!("Poll interval must be no longer than the connect timeout");
        }
        if self.sample_rate == 0 {
            anyhow::bail!("Sample rate must be positive");
        }

        self.synthesis.validate()?;

        let default_voice = self.effective_default_voice();
        let pool = self.effective_voice_pool();
        if !pool.iter().any(|voice| *voice != default_voice) {
            anyhow::bail!("Voice pool needs at least one voice besides the default voice '{}'", default_voice);
        }

        if self.backend == Backend::Kokoro {
            for voice in pool.iter().chain(std::iter::once(&default_voice)) {
                if voices::get_voice(voice).is_none() {
                    anyhow::bail!("Unknown Kokoro voice '{}'. Run with --list-voices to see available voices", voice);
                }
            }
            if !self.model_dir.exists() {
                anyhow::bail!("Model directory does not exist: {}", self.model_dir.display());
            }
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        if let Some(path) = &self.config {
            info!("  Config file: {}", path.display());
        }
        info!("  Backend: {}", self.backend);
        match self.backend {
            Backend::Command => {
                info!("  Synthesis command: {}", self.jtalk_bin.display());
                info!("  Dictionary: {}", self.jtalk_dict.display());
                info!("  Voice directory: {}", self.voice_dir.display());
            }
            Backend::Kokoro => {
                info!("  Model directory: {}", self.model_dir.display());
                info!("  TTS threads: {}", self.tts_threads);
            }
        }
        info!("  Sink: {}", self.sink);
        if self.sink == SinkKind::Wav {
            info!("  Spool directory: {}", self.spool_dir.display());
        }
        info!("  Voice pool: {}", self.effective_voice_pool().join(", "));
        info!("  Default voice: {}", self.effective_default_voice());
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  Speed: {}", self.synthesis.speed);
        info!("  Connect timeout: {}s (poll every {}s)", self.connect_timeout, self.poll_interval);
        info!("  Synthesis timeout: {}s, concurrency: {}", self.synthesis_timeout, self.max_concurrent_synthesis);
        if !self.ignore_prefix.is_empty() {
            info!("  Ignoring messages starting with '{}'", self.ignore_prefix);
        }
    }
}

/// Parse a timing option, rejecting NaN, zero, negative and absurdly large values.
fn seconds(name: &str, value: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() && value <= MAX_SECONDS => Ok(duration),
        _ => anyhow::bail!("{} must be between 0 and {} seconds, got {}", name, MAX_SECONDS, value),
    }
}

/// Config file locations tried in order: working directory, home, ~/.local, executable directory.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home_dir) = dirs::home_dir() {
        paths.push(home_dir.join(CONFIG_FILE_NAME));
        paths.push(home_dir.join(".local").join(CONFIG_FILE_NAME));
    }
    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Get the default data directory (~/.voice-reader).
fn default_data_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".voice-reader")
    } else {
        PathBuf::from(".voice-reader")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        let mut config = AppConfig::parse_from(std::iter::once("voice-reader").chain(args.iter().copied()));
        config.normalize();
        config
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = parse(&[]);
        assert_eq!(config.backend, Backend::Command);
        assert_eq!(config.sink, SinkKind::Wav);
        assert!(config.max_concurrent_synthesis >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_voice_pool_from_cli() {
        let config = parse(&["--voices", "alpha, beta,,gamma", "--default-voice", "system"]);
        assert_eq!(config.effective_voice_pool(), vec!["alpha", "beta", "gamma"]);

        let reader = config.reader_config().unwrap();
        assert_eq!(reader.default_voice, "system");
        assert_eq!(reader.connect_timeout, Duration::from_secs(6));
        assert_eq!(reader.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_backend_default_pools() {
        let config = parse(&["--backend", "kokoro"]);
        let pool = config.effective_voice_pool();
        assert!(pool.contains(&"af_bella".to_string()));
        assert_eq!(config.effective_default_voice(), "af_bella");

        let config = parse(&[]);
        assert_eq!(config.effective_default_voice(), "mei_normal");
        assert!(config.effective_voice_pool().contains(&"mei_happy".to_string()));
    }

    #[test]
    fn test_pool_of_only_default_voice_is_rejected() {
        let config = parse(&["--voices", "mei_normal"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_kokoro_voice_is_rejected() {
        let config = parse(&["--backend", "kokoro", "--voices", "af_bella,not_a_voice", "--default-voice", "bf_emma"]);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("not_a_voice"), "{}", err);
    }

    #[test]
    fn test_timing_validation() {
        assert!(parse(&["--connect-timeout", "0"]).validate().is_err());
        assert!(parse(&["--poll-interval", "10"]).validate().is_err());
        assert!(parse(&["--synthesis-timeout", "0"]).validate().is_err());
    }

    #[test]
    fn test_unrepresentable_timings_are_rejected() {
        for args in [
            ["--connect-timeout", "1e30"],
            ["--connect-timeout", "inf"],
            ["--poll-interval", "NaN"],
            ["--synthesis-timeout", "NaN"],
        ] {
            let config = parse(&args);
            assert!(config.validate().is_err(), "{:?} passed validation", args);
            assert!(config.reader_config().is_err(), "{:?} built a reader config", args);
        }
        assert!(parse(&["--speed", "NaN"]).validate().is_err());
        assert!(parse(&["--volume-db", "NaN"]).validate().is_err());
    }

    fn write_config(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, json).unwrap();
        path
    }

    fn load(args: &[&str], search_paths: &[PathBuf]) -> Result<AppConfig> {
        let matches = AppConfig::command().try_get_matches_from(std::iter::once("voice-reader").chain(args.iter().copied()))?;
        AppConfig::from_matches(&matches, search_paths)
    }

    #[test]
    fn test_config_file_sits_below_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{"connect_timeout": 2.5, "poll_interval": 0.2, "voices": ["alpha", "beta"], "speed": 1.5, "voice_hello": "hi"}"#,
        );
        let path_arg = path.to_string_lossy().to_string();

        let config = load(&["--config", &path_arg, "--connect-timeout", "4"], &[]).unwrap();
        assert_eq!(config.connect_timeout, 4.0);
        assert_eq!(config.poll_interval, 0.2);
        assert_eq!(config.voices, vec!["alpha", "beta"]);
        assert_eq!(config.synthesis.speed, 1.5);
        assert_eq!(config.announcements.voice_hello, "hi");
        assert_eq!(config.announcements.voice_goodbye, Announcements::default().voice_goodbye);
        assert_eq!(config.config, Some(path));
    }

    #[test]
    fn test_config_file_search_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let search = [first.path().join(CONFIG_FILE_NAME), second.path().join(CONFIG_FILE_NAME)];

        let config = load(&[], &search).unwrap();
        assert_eq!(config.config, None);
        assert_eq!(config.sample_rate, 48000);

        write_config(second.path(), r#"{"sample_rate": 24000}"#);
        let config = load(&[], &search).unwrap();
        assert_eq!(config.config.as_deref(), Some(search[1].as_path()));
        assert_eq!(config.sample_rate, 24000);

        write_config(first.path(), r#"{"sample_rate": 16000}"#);
        let config = load(&[], &search).unwrap();
        assert_eq!(config.config.as_deref(), Some(search[0].as_path()));
        assert_eq!(config.sample_rate, 16000);
    }

    #[test]
    fn test_bad_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let unknown = write_config(dir.path(), r#"{"not_an_option": 1}"#);
        assert!(load(&[], &[unknown]).is_err());

        let wrong_type = write_config(dir.path(), r#"{"sample_rate": "fast"}"#);
        assert!(load(&[], &[wrong_type]).is_err());

        let missing = dir.path().join("nope.json").to_string_lossy().to_string();
        assert!(load(&["--config", &missing], &[]).is_err());
    }

    #[test]
    fn test_synthesis_param_ranges() {
        assert!(SynthesisParams::default().validate().is_ok());
        assert!(SynthesisParams { all_pass: Some(1.5), ..Default::default() }.validate().is_err());
        assert!(SynthesisParams { threshold: -0.1, ..Default::default() }.validate().is_err());
        assert!(SynthesisParams { speed: 0.0, ..Default::default() }.validate().is_err());
        assert!(SynthesisParams { frame_period: Some(0), ..Default::default() }.validate().is_err());
        assert!(SynthesisParams { half_tone: -3.0, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn test_negative_half_tone_on_cli() {
        let config = parse(&["--half-tone", "-2.5"]);
        assert_eq!(config.synthesis.half_tone, -2.5);
    }

    #[test]
    fn test_announcement_templates() {
        let announcements = Announcements::default();
        assert_eq!(announcements.joined("alice"), "alice joined.");
        assert_eq!(announcements.left("bob"), "bob left.");
    }
}
