//! Application configuration.
//!
//! Loaded from a TOML file and overlaid with environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::models::{Credentials, SessionKind};

/// Telegram application credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub api_id: Option<String>,
    #[serde(default)]
    pub api_hash: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl TelegramConfig {
    /// Credentials with absent values left empty; presence is validated on use.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_id: self.api_id.clone().unwrap_or_default(),
            api_hash: self.api_hash.clone().unwrap_or_default(),
            phone_number: self.phone_number.clone(),
        }
    }
}

/// Session storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub kind: SessionKind,

    /// Session identifier; the file store names its file after it.
    #[serde(default = "default_session_name")]
    pub name: String,

    /// Directory holding session files (defaults to the data dir).
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kind: SessionKind::default(),
            name: default_session_name(),
            dir: None,
        }
    }
}

fn default_session_name() -> String {
    "telegram_api_session".to_string()
}

/// Export output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    #[serde(default = "default_archive_name")]
    pub archive_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            archive_name: default_archive_name(),
        }
    }
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("parse_results_dir")
}

fn default_archive_name() -> String {
    "parse_results_csv.zip".to_string()
}

/// Rate-limit throttling during history fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Pause after this many messages.
    #[serde(default = "default_throttle_every")]
    pub throttle_every: u64,

    #[serde(default = "default_throttle_pause_ms")]
    pub throttle_pause_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            throttle_every: default_throttle_every(),
            throttle_pause_ms: default_throttle_pause_ms(),
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub const fn throttle_pause(&self) -> Duration {
        Duration::from_millis(self.throttle_pause_ms)
    }
}

const fn default_throttle_every() -> u64 {
    1000
}

const fn default_throttle_pause_ms() -> u64 {
    1000
}

/// Protocol backend configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Telegram Desktop `result.json` served by the archive backend.
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}

impl AppConfig {
    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tg-history-export")
    }

    /// Directory holding session files.
    #[must_use]
    pub fn session_dir(&self) -> PathBuf {
        self.session
            .dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }
}
