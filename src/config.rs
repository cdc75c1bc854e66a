//! Configuration file, environment overrides and validation.

use crate::commands::{Action, PhraseTable, Scorer, default_actions};
use crate::defaults;
use crate::error::{Result, VoxgateError};
use crate::pipeline::{ListenerConfig, OverflowPolicy, SegmenterConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Phrase table shipped with the binary, used when none is configured.
pub const BUNDLED_PHRASES: &str = include_str!("../assets/commands.csv");

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub wake: WakeConfig,
    pub command: CommandConfig,
    pub stt: SttConfig,
    pub resolver: ResolverConfig,
    /// Extra or replacement action bindings, merged over the built-in ones.
    pub actions: BTreeMap<String, Action>,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub chunk_ms: u32,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadConfig {
    /// Mean absolute amplitude above which a chunk is speech.
    pub threshold: f64,
}

/// Wake phrase detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WakeConfig {
    pub phrase: String,
    pub context_ms: u32,
    pub scan_interval_ms: u32,
    pub min_scan_ms: u32,
    pub onset_ms: u32,
    pub grace_ms: u32,
    /// Play a tone when the wake phrase is confirmed.
    pub beep: bool,
}

/// Command capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandConfig {
    pub pause_ms: u32,
    pub min_ms: u32,
    pub max_ms: u32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub model: String,
    pub language: String,
    pub threads: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Phrase table path. Relative paths are resolved against the config
    /// file's directory.
    pub phrases: Option<PathBuf>,
    pub threshold: u8,
    pub scorer: Scorer,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            chunk_ms: defaults::CHUNK_MS,
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: f64::from(defaults::VAD_THRESHOLD),
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrase: defaults::WAKE_PHRASE.to_string(),
            context_ms: defaults::CONTEXT_MS,
            scan_interval_ms: defaults::SCAN_INTERVAL_MS,
            min_scan_ms: defaults::MIN_SCAN_MS,
            onset_ms: defaults::ONSET_MS,
            grace_ms: defaults::GRACE_MS,
            beep: true,
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            pause_ms: defaults::PAUSE_MS,
            min_ms: defaults::MIN_COMMAND_MS,
            max_ms: defaults::MAX_COMMAND_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::MODEL.to_string(),
            language: defaults::LANGUAGE.to_string(),
            threads: None,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            phrases: None,
            threshold: defaults::RESOLVE_THRESHOLD,
            scorer: Scorer::default(),
        }
    }
}

fn invalid(key: &str, message: &str) -> VoxgateError {
    VoxgateError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VoxgateError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VoxgateError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, or defaults if the file does not exist.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VoxgateError::ConfigFileNotFound { .. }) => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXGATE_MODEL → stt.model
    /// - VOXGATE_LANGUAGE → stt.language
    /// - VOXGATE_AUDIO_DEVICE → audio.device
    /// - VOXGATE_WAKE_PHRASE → wake.phrase
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VOXGATE_MODEL")
            && !model.is_empty()
        {
            self.stt.model = model;
        }

        if let Ok(language) = std::env::var("VOXGATE_LANGUAGE")
            && !language.is_empty()
        {
            self.stt.language = language;
        }

        if let Ok(device) = std::env::var("VOXGATE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(phrase) = std::env::var("VOXGATE_WAKE_PHRASE")
            && !phrase.is_empty()
        {
            self.wake.phrase = phrase;
        }

        self
    }

    /// Reject values the listener cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate != defaults::SAMPLE_RATE {
            return Err(invalid(
                "audio.sample_rate",
                &format!("only {} Hz is supported", defaults::SAMPLE_RATE),
            ));
        }
        if self.audio.chunk_ms == 0 {
            return Err(invalid("audio.chunk_ms", "must be greater than zero"));
        }
        if self.audio.queue_capacity == 0 {
            return Err(invalid("audio.queue_capacity", "must be greater than zero"));
        }
        if !(self.vad.threshold > 0.0 && self.vad.threshold <= 1.0) {
            return Err(invalid("vad.threshold", "must be in (0, 1]"));
        }
        if self.wake.phrase.trim().is_empty() {
            return Err(invalid("wake.phrase", "must not be empty"));
        }
        if self.wake.scan_interval_ms == 0 {
            return Err(invalid("wake.scan_interval_ms", "must be greater than zero"));
        }
        if self.wake.context_ms == 0 {
            return Err(invalid("wake.context_ms", "must be greater than zero"));
        }
        if self.wake.min_scan_ms > self.wake.context_ms {
            return Err(invalid("wake.min_scan_ms", "must not exceed wake.context_ms"));
        }
        if self.wake.onset_ms > self.wake.context_ms {
            return Err(invalid("wake.onset_ms", "must not exceed wake.context_ms"));
        }
        if self.command.pause_ms == 0 {
            return Err(invalid("command.pause_ms", "must be greater than zero"));
        }
        if self.command.min_ms > self.command.max_ms {
            return Err(invalid("command.min_ms", "must not exceed command.max_ms"));
        }
        if self.wake.grace_ms >= self.command.max_ms {
            return Err(invalid("wake.grace_ms", "must be shorter than command.max_ms"));
        }
        if self.resolver.threshold > 100 {
            return Err(invalid("resolver.threshold", "must be between 0 and 100"));
        }
        Ok(())
    }

    /// Segmentation timing in samples.
    pub fn segmenter_config(&self) -> SegmenterConfig {
        let rate = self.audio.sample_rate;
        let samples = |ms| defaults::ms_to_samples(ms, rate);
        SegmenterConfig {
            sample_rate: rate,
            context_samples: samples(self.wake.context_ms),
            scan_interval_samples: samples(self.wake.scan_interval_ms),
            min_scan_samples: samples(self.wake.min_scan_ms),
            onset_samples: samples(self.wake.onset_ms),
            grace_samples: samples(self.wake.grace_ms),
            pause_samples: samples(self.command.pause_ms),
            min_command_samples: samples(self.command.min_ms),
            max_command_samples: samples(self.command.max_ms),
            vad_threshold: self.vad.threshold as f32,
        }
    }

    pub fn listener_config(&self, overflow: OverflowPolicy) -> ListenerConfig {
        ListenerConfig {
            segmenter: self.segmenter_config(),
            chunk_samples: defaults::ms_to_samples(self.audio.chunk_ms, self.audio.sample_rate),
            queue_capacity: self.audio.queue_capacity,
            overflow,
            wake_phrase: self.wake.phrase.clone(),
            // A source that can block is not real-time; keep it in step with scans.
            wait_for_scans: overflow == OverflowPolicy::Block,
        }
    }

    /// Built-in actions with the configured ones merged over them.
    pub fn actions(&self) -> BTreeMap<String, Action> {
        let mut actions = default_actions();
        actions.extend(self.actions.clone());
        actions
    }

    /// Where the phrase table is read from, `None` meaning the bundled table.
    ///
    /// An explicit path is always returned; the implicit `commands.csv`
    /// next to the config file only if it exists.
    pub fn phrases_path(&self, config_path: &Path) -> Option<PathBuf> {
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        match &self.resolver.phrases {
            Some(path) if path.is_absolute() => Some(path.clone()),
            Some(path) => Some(base.join(path)),
            None => {
                let implicit = base.join(defaults::PHRASES_FILE);
                implicit.exists().then_some(implicit)
            }
        }
    }

    /// Load the phrase table this configuration points at.
    pub fn load_phrase_table(&self, config_path: &Path) -> Result<PhraseTable> {
        match self.phrases_path(config_path) {
            Some(path) => PhraseTable::load(&path),
            None => {
                tracing::debug!("using bundled phrase table");
                PhraseTable::parse(BUNDLED_PHRASES)
            }
        }
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoxgateError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxgate/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxgate")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::{NamedTempFile, TempDir};

    // Serializes tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: only called with ENV_LOCK held.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_voxgate_env() {
        remove_env("VOXGATE_MODEL");
        remove_env("VOXGATE_LANGUAGE");
        remove_env("VOXGATE_AUDIO_DEVICE");
        remove_env("VOXGATE_WAKE_PHRASE");
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();
        assert_eq!(config.audio.device, None);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.chunk_ms, 500);
        assert_eq!(config.vad.threshold as f32, 0.01);
        assert_eq!(config.wake.phrase, "garmin");
        assert_eq!(config.wake.grace_ms, 1500);
        assert!(config.wake.beep);
        assert_eq!(config.command.pause_ms, 1000);
        assert_eq!(config.command.max_ms, 15000);
        assert_eq!(config.resolver.threshold, 70);
        assert_eq!(config.resolver.scorer, Scorer::TokenSet);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let file = write_config(
            r#"
            [audio]
            device = "pipewire"
            chunk_ms = 250

            [wake]
            phrase = "computer"
            beep = false

            [command]
            max_ms = 10000

            [resolver]
            threshold = 80
            scorer = "token_sort"

            [actions.open_docs]
            kind = "open_url"
            url = "https://docs.rs"
            "#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.audio.device.as_deref(), Some("pipewire"));
        assert_eq!(config.audio.chunk_ms, 250);
        assert_eq!(config.wake.phrase, "computer");
        assert!(!config.wake.beep);
        assert_eq!(config.command.max_ms, 10000);
        assert_eq!(config.command.min_ms, 1000);
        assert_eq!(config.resolver.threshold, 80);
        assert_eq!(config.resolver.scorer, Scorer::TokenSort);

        let actions = config.actions();
        assert!(actions.contains_key("open_docs"));
        assert!(actions.contains_key("tell_time"));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let file = write_config("[audio\nchunk_ms = ");
        assert!(matches!(Config::load(file.path()), Err(VoxgateError::Config(_))));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let file = write_config("[wake]\ngrace_ms = \"long\"\n");
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/voxgate/config.toml"));
        assert!(matches!(result, Err(VoxgateError::ConfigFileNotFound { .. })));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/voxgate/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_rejects_invalid_toml() {
        let file = write_config("not = [valid");
        assert!(Config::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_voxgate_env();
        set_env("VOXGATE_MODEL", "small.en");
        set_env("VOXGATE_LANGUAGE", "de");
        set_env("VOXGATE_AUDIO_DEVICE", "hw:1,0");
        set_env("VOXGATE_WAKE_PHRASE", "jarvis");

        let config = Config::default().with_env_overrides();
        clear_voxgate_env();

        assert_eq!(config.stt.model, "small.en");
        assert_eq!(config.stt.language, "de");
        assert_eq!(config.audio.device.as_deref(), Some("hw:1,0"));
        assert_eq!(config.wake.phrase, "jarvis");
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_voxgate_env();
        set_env("VOXGATE_MODEL", "");
        set_env("VOXGATE_WAKE_PHRASE", "");

        let config = Config::default().with_env_overrides();
        clear_voxgate_env();

        assert_eq!(config.stt.model, "tiny.en");
        assert_eq!(config.wake.phrase, "garmin");
    }

    #[test]
    fn test_validate_rejects_other_sample_rates() {
        let mut config = Config::default();
        config.audio.sample_rate = 44100;
        assert!(matches!(
            config.validate(),
            Err(VoxgateError::ConfigInvalidValue { key, .. }) if key == "audio.sample_rate"
        ));
    }

    fn assert_rejected(expected_key: &str, mutate: impl FnOnce(&mut Config)) {
        let mut config = Config::default();
        mutate(&mut config);
        match config.validate() {
            Err(VoxgateError::ConfigInvalidValue { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("{}: expected invalid value, got {:?}", expected_key, other),
        }
    }

    #[test]
    fn test_validate_rejects_inconsistent_durations() {
        assert_rejected("audio.chunk_ms", |c| c.audio.chunk_ms = 0);
        assert_rejected("audio.queue_capacity", |c| c.audio.queue_capacity = 0);
        assert_rejected("wake.scan_interval_ms", |c| c.wake.scan_interval_ms = 0);
        assert_rejected("command.pause_ms", |c| c.command.pause_ms = 0);
        assert_rejected("command.min_ms", |c| c.command.min_ms = 20000);
        assert_rejected("wake.grace_ms", |c| c.wake.grace_ms = 15000);
        assert_rejected("wake.onset_ms", |c| c.wake.onset_ms = 5000);
        assert_rejected("wake.min_scan_ms", |c| c.wake.min_scan_ms = 4000);
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        assert_rejected("vad.threshold", |c| c.vad.threshold = 0.0);
        assert_rejected("vad.threshold", |c| c.vad.threshold = 1.5);
        assert_rejected("wake.phrase", |c| c.wake.phrase = "  ".to_string());
        assert_rejected("resolver.threshold", |c| c.resolver.threshold = 101);
    }

    #[test]
    fn test_segmenter_config_converts_to_samples() {
        let config = Config::default();
        let segmenter = config.segmenter_config();
        assert_eq!(segmenter.context_samples, 48000);
        assert_eq!(segmenter.grace_samples, 24000);
        assert_eq!(segmenter.max_command_samples, 240000);
        assert_eq!(segmenter, SegmenterConfig::default());

        let listener = config.listener_config(OverflowPolicy::DropOldest);
        assert_eq!(listener.chunk_samples, 8000);
        assert_eq!(listener.wake_phrase, "garmin");
        assert!(!listener.wait_for_scans);
        assert!(config.listener_config(OverflowPolicy::Block).wait_for_scans);
    }

    #[test]
    fn test_phrases_path_resolution() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");

        let mut config = Config::default();
        assert_eq!(config.phrases_path(&config_path), None);

        fs::write(dir.path().join("commands.csv"), "command,phrase\nx,y\n").unwrap();
        assert_eq!(
            config.phrases_path(&config_path),
            Some(dir.path().join("commands.csv"))
        );

        config.resolver.phrases = Some(PathBuf::from("custom.csv"));
        assert_eq!(
            config.phrases_path(&config_path),
            Some(dir.path().join("custom.csv"))
        );
    }

    #[test]
    fn test_bundled_phrase_table_loads() {
        let dir = TempDir::new().unwrap();
        let table = Config::default()
            .load_phrase_table(&dir.path().join("config.toml"))
            .unwrap();
        assert!(table.phrases("open_youtube").is_some());
        assert!(table.phrases("tell_time").is_some());
    }

    #[test]
    fn test_toml_output_round_trips() {
        let mut config = Config::default();
        config.audio.device = Some("pipewire".to_string());
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        assert!(path.ends_with("voxgate/config.toml"));
    }
}
