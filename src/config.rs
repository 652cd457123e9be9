//! Configuration management for Velox
//!
//! Provides persistent settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.velox/config.json`. Every timing constant the
//! gesture detector and session controller rely on lives here so that hosts can
//! tune them without a rebuild.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Long-press and shake detection
    pub gesture: GestureConfig,
    /// Voice session timing and feedback
    pub session: SessionConfig,
    /// Parameters handed to the speech engine for every capture
    pub recognition: RecognitionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            gesture: GestureConfig::default(),
            session: SessionConfig::default(),
            recognition: RecognitionConfig::default(),
        }
    }
}

/// Gesture detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Whether the volume-button long press may trigger a session
    pub volume_button_enabled: bool,
    /// Hold duration that turns a press into a trigger (ms)
    pub long_press_threshold_ms: u64,
    /// Delay of the backup volume restore after a long-press release (ms)
    pub volume_restore_backup_ms: u64,
    /// Delay before the wake lock is dropped after a long-press release (ms)
    pub wake_lock_release_ms: u64,
    /// Safety timeout handed to the host wake lock (ms)
    pub wake_lock_timeout_ms: u64,
    /// Haptic pulse length when a long press is recognised (ms)
    pub haptic_pulse_ms: u64,
    /// Whether shaking the device may trigger a session
    pub shake_enabled: bool,
    /// Combined acceleration, in g, above which a sample counts as a shake
    pub shake_threshold_g: f32,
    /// Minimum time between two accepted shakes (ms)
    pub shake_slop_ms: u64,
    /// Safety timeout of the wake lock held while shake detection runs (ms)
    pub shake_wake_lock_timeout_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            volume_button_enabled: true,
            long_press_threshold_ms: 700,
            volume_restore_backup_ms: 100,
            wake_lock_release_ms: 200,
            wake_lock_timeout_ms: 10_000,
            haptic_pulse_ms: 50,
            shake_enabled: true,
            shake_threshold_g: 2.7,
            shake_slop_ms: 500,
            shake_wake_lock_timeout_ms: 600_000,
        }
    }
}

impl GestureConfig {
    pub fn long_press_threshold(&self) -> Duration {
        Duration::from_millis(self.long_press_threshold_ms)
    }

    pub fn volume_restore_backup(&self) -> Duration {
        Duration::from_millis(self.volume_restore_backup_ms)
    }

    pub fn wake_lock_release(&self) -> Duration {
        Duration::from_millis(self.wake_lock_release_ms)
    }

    pub fn wake_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_lock_timeout_ms)
    }

    pub fn haptic_pulse(&self) -> Duration {
        Duration::from_millis(self.haptic_pulse_ms)
    }

    pub fn shake_slop(&self) -> Duration {
        Duration::from_millis(self.shake_slop_ms)
    }

    pub fn shake_wake_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.shake_wake_lock_timeout_ms)
    }
}

/// Voice session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether to play the earcon and confirmation tones
    pub play_tones: bool,
    /// Tone generator volume (0-100)
    pub tone_volume: u8,
    /// Length of the earcon and confirmation tones (ms)
    pub tone_duration_ms: u64,
    /// Delay between the earcon and the start of capture (ms)
    pub earcon_to_listen_ms: u64,
    /// Delay before the earcon tone resource is released (ms)
    pub earcon_release_ms: u64,
    /// Delay before the confirmation tone is released and the session closes (ms)
    pub confirmation_tone_ms: u64,
    /// Cooldown before rebuilding the speech engine after a client fault (ms)
    pub reinit_cooldown_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            play_tones: true,
            tone_volume: 80,
            tone_duration_ms: 100,
            earcon_to_listen_ms: 300,
            earcon_release_ms: 150,
            confirmation_tone_ms: 200,
            reinit_cooldown_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn tone_duration(&self) -> Duration {
        Duration::from_millis(self.tone_duration_ms)
    }

    pub fn earcon_to_listen(&self) -> Duration {
        Duration::from_millis(self.earcon_to_listen_ms)
    }

    pub fn earcon_release(&self) -> Duration {
        Duration::from_millis(self.earcon_release_ms)
    }

    pub fn confirmation_tone(&self) -> Duration {
        Duration::from_millis(self.confirmation_tone_ms)
    }

    pub fn reinit_cooldown(&self) -> Duration {
        Duration::from_millis(self.reinit_cooldown_ms)
    }
}

/// Language model requested from the recognition engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LanguageModel {
    /// Free-form dictation
    #[default]
    FreeForm,
    /// Short web-search style queries
    WebSearch,
}

/// Recognition parameters for a single capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// BCP-47 language tag (e.g., "en-US")
    pub language: String,
    pub language_model: LanguageModel,
    /// Maximum number of alternatives in a final result
    pub max_results: u32,
    /// Whether the engine should stream partial results
    pub partial_results: bool,
    /// Minimum capture length before the engine may finish (ms)
    pub min_speech_ms: u64,
    /// Trailing silence that completes a capture (ms)
    pub complete_silence_ms: u64,
    /// Prefer an on-device model over a network one
    pub prefer_offline: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            language_model: LanguageModel::FreeForm,
            max_results: 5,
            partial_results: true,
            min_speech_ms: 3000,
            complete_silence_ms: 1500,
            prefer_offline: false,
        }
    }
}

/// Get the path to the config file (~/.velox/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the path to the config directory (~/.velox)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".velox")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from `path`, returning defaults if the file is missing.
///
/// Older schema versions are migrated and written back.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to(path, &migrated)?;
    }

    Ok(migrated)
}

/// Save configuration to `path` as pretty-printed JSON
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;

    tracing::debug!("Config saved to {:?}", path);
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    let original_version = config.version;

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigError> {
    match config.version {
        // Version 0 -> 1: tone and reinit timings were introduced; defaults fill them in
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static RwLock<Config> {
    CONFIG.get_or_init(|| {
        let config = load_from(&get_config_path()).unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        });
        RwLock::new(config)
    })
}

/// Get the current configuration
///
/// The config is cached in memory and loaded from disk on first access.
pub fn get_config() -> Config {
    get_config_instance().read().clone()
}

/// Replace the cached configuration and persist it to the default path
pub fn set_config(mut config: Config) -> Result<(), ConfigError> {
    config.version = CURRENT_VERSION;
    save_to(&get_config_path(), &config)?;

    let mut cached = get_config_instance().write();
    *cached = config;

    tracing::info!(
        "Configuration updated (long press: {}ms, shake: {}g)",
        cached.gesture.long_press_threshold_ms,
        cached.gesture.shake_threshold_g
    );
    Ok(())
}
