use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Overrides `models_dir`
pub const MODELS_DIR_ENV: &str = "VOSK_MODELS_DIR";

/// Overrides `capture_fifo`
pub const CAPTURE_FIFO_ENV: &str = "VOSK_CAPTURE_FIFO";

const MAX_RETRY_DELAY_MS: u64 = 10_000;

/// Runtime settings for the session layer.
///
/// Every field has a default, so a settings file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Where bundled models are looked up when a load path doesn't exist
    pub models_dir: PathBuf,
    /// Named pipe the capture process writes PCM into
    pub capture_fifo: PathBuf,
    /// Read size for `transcribe_file`, in bytes
    pub file_chunk_bytes: usize,
    /// Samples the continuous driver reads per iteration (3200 = 0.2 s)
    pub capture_chunk_samples: usize,
    /// Longest a driver read waits before checking stop/timeout
    pub poll_interval_ms: u64,
    /// Consecutive capture read failures tolerated
    pub read_retries: u32,
    pub retry_delay_ms: u64,
    /// Silence the engine's own logging below error level
    pub engine_quiet: bool,
    /// Default `tracing` filter when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            models_dir: data_dir.join("vosk").join("models"),
            capture_fifo: std::env::temp_dir().join("vosk_capture.fifo"),
            file_chunk_bytes: 4096,
            capture_chunk_samples: 3200,
            poll_interval_ms: 50,
            read_retries: 3,
            retry_delay_ms: 100,
            engine_quiet: true,
            log_filter: "vosk_session=info".to_string(),
        }
    }
}

impl Settings {
    /// Validates settings constraints
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - file_chunk_bytes is odd or below 2
    /// - capture_chunk_samples is 0
    /// - poll_interval_ms is not in range [1, 1000]
    /// - retry_delay_ms is above 10000
    /// - models_dir or capture_fifo is empty
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.file_chunk_bytes < 2 || self.file_chunk_bytes % 2 != 0 {
            return Err(SessionError::InvalidSettings(format!(
                "file_chunk_bytes must be an even number >= 2, got {}",
                self.file_chunk_bytes
            )));
        }

        if self.capture_chunk_samples == 0 {
            return Err(SessionError::InvalidSettings(
                "capture_chunk_samples must be greater than 0".to_string(),
            ));
        }

        if !(1..=1000).contains(&self.poll_interval_ms) {
            return Err(SessionError::InvalidSettings(format!(
                "poll_interval_ms must be between 1 and 1000, got {}",
                self.poll_interval_ms
            )));
        }

        if self.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(SessionError::InvalidSettings(format!(
                "retry_delay_ms must be at most {}, got {}",
                MAX_RETRY_DELAY_MS, self.retry_delay_ms
            )));
        }

        if self.models_dir.as_os_str().is_empty() {
            return Err(SessionError::InvalidSettings(
                "models_dir cannot be empty".to_string(),
            ));
        }

        if self.capture_fifo.as_os_str().is_empty() {
            return Err(SessionError::InvalidSettings(
                "capture_fifo cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply overrides from `lookup` (environment-shaped: key to value).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(MODELS_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("Settings: {} overrides models_dir", MODELS_DIR_ENV);
            self.models_dir = PathBuf::from(dir);
        }
        if let Some(fifo) = lookup(CAPTURE_FIFO_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("Settings: {} overrides capture_fifo", CAPTURE_FIFO_ENV);
            self.capture_fifo = PathBuf::from(fifo);
        }
    }
}

/// Loads settings once at startup.
///
/// The file is only ever read; a missing file means defaults.
pub struct SettingsManager {
    settings_path: PathBuf,
    current_settings: Settings,
}

impl SettingsManager {
    /// Loads settings from `<config_dir>/vosk-session/settings.json`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The platform has no config directory
    /// - The settings file exists but can't be read
    /// - The resulting settings fail validation
    pub fn new() -> Result<Self, SessionError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            SessionError::InvalidSettings("Failed to get config directory".to_string())
        })?;

        Self::new_with_path(config_dir.join("vosk-session").join("settings.json"))
    }

    /// Loads settings from a custom path, then applies environment overrides
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new), minus the config directory lookup.
    pub fn new_with_path(settings_path: PathBuf) -> Result<Self, SessionError> {
        Self::load(settings_path, |key| std::env::var(key).ok())
    }

    pub(crate) fn load(
        settings_path: PathBuf,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SessionError> {
        let mut settings = if settings_path.exists() {
            Self::load_from_file(&settings_path)?
        } else {
            info!("Settings: no file at {:?}, using defaults", settings_path);
            Settings::default()
        };

        settings.apply_overrides(lookup);
        settings.validate()?;

        Ok(Self {
            settings_path,
            current_settings: settings,
        })
    }

    /// Returns a clone of the current settings
    pub fn get(&self) -> Settings {
        self.current_settings.clone()
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Loads settings from disk
    ///
    /// If the file contains invalid JSON, logs a warning and returns defaults
    /// to ensure graceful degradation.
    fn load_from_file(path: &Path) -> Result<Settings, SessionError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SessionError::InvalidSettings(format!("Failed to read settings file: {}", e))
        })?;

        match serde_json::from_str(&contents) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Failed to parse settings JSON: {}. Using defaults.", e);
                Ok(Settings::default())
            }
        }
    }
}
