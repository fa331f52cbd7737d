//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSTRIP_CONFIG` (environment variable)
//! 2. `~/.config/mailstrip/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailstrip\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::strip::{DEFAULT_ATTACHMENT_TYPES, DEFAULT_MARKER, DEFAULT_SIZE_THRESHOLD};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Batch run settings (which messages, where attachments go).
    pub run: RunConfig,
    /// Stripper patterns and thresholds.
    pub strip: StripSettings,
    /// Naming of saved attachments.
    pub attachments: AttachmentConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for indexes and logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Batch run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Search query selecting the messages to process.
    pub query: String,
    /// Destination folder for saved attachments.
    pub folder: String,
    /// Maximum number of messages per run (0 = no limit).
    pub limit: usize,
    /// Search, fetch and strip only; never write anything.
    pub dry_run: bool,
}

/// Stripper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StripSettings {
    /// Size in bytes above which the in-place excision pass runs.
    pub size_threshold: usize,
    /// Text appended to every stripped message.
    pub marker: String,
    /// Attachment content types the excision pass removes.
    pub attachment_types: Vec<String>,
}

/// Naming of saved attachment files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Subject characters kept in the file name.
    pub subject_max_chars: usize,
    /// `strftime` format of the timestamp prefix.
    pub timestamp_format: String,
    /// Format timestamps in UTC instead of local time.
    pub utc: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            query: "larger:5M before:2024".to_string(),
            folder: "attachments".to_string(),
            limit: 0,
            dry_run: false,
        }
    }
}

impl Default for StripSettings {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            marker: DEFAULT_MARKER.to_string(),
            attachment_types: DEFAULT_ATTACHMENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            subject_max_chars: 50,
            timestamp_format: "%Y-%m-%d_%H%M%S".to_string(),
            utc: false,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location and return the path written.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSTRIP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailstrip").join("config.toml"))
}

/// Return the cache directory for indexes, logs, etc.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailstrip")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailstrip.log")
}
