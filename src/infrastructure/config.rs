//! Configuration file management.
//!
//! Loads TOML configuration files, writes the default file on `init` and
//! applies the environment overlay for Telegram credentials.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppConfig, AppError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# tg-history-export configuration
# Auto-generated - edit as needed

[telegram]
# Application credentials from https://my.telegram.org
# (API_ID / API_HASH / PHONE_NUMBER in the environment take precedence)
# api_id = "12345"
# api_hash = "0123456789abcdef0123456789abcdef"
# phone_number = "+10000000000"

[session]
# "file" keeps the session in <dir>/<name>.session, "memory" forgets it on exit
kind = "file"
name = "telegram_api_session"
# dir = "/custom/path"

[export]
# Per-chat CSV tables are written here
results_dir = "parse_results_dir"
archive_name = "parse_results_csv.zip"

[fetch]
# Pause after every N messages to stay under rate limits
throttle_every = 1000
throttle_pause_ms = 1000

[backend]
# Telegram Desktop export (result.json) to serve history from
# archive_path = "/path/to/ChatExport/result.json"
"#;

/// Environment variables overlaid on the file configuration.
pub const ENV_API_ID: &str = "API_ID";
pub const ENV_API_HASH: &str = "API_HASH";
pub const ENV_PHONE_NUMBER: &str = "PHONE_NUMBER";
pub const ENV_ARCHIVE_PATH: &str = "TG_ARCHIVE_PATH";

/// Load configuration from the default location, or defaults when absent.
///
/// # Errors
/// Returns error if file exists but cannot be read or parsed.
pub fn load_config() -> Result<AppConfig> {
    let config_path = config_file_path();

    if config_path.exists() {
        load_config_from_file(&config_path)
    } else {
        Ok(AppConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Overlay credentials and backend settings from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Overlay settings from `lookup`; blank values are ignored.
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(api_id) = get(ENV_API_ID) {
        config.telegram.api_id = Some(api_id);
    }
    if let Some(api_hash) = get(ENV_API_HASH) {
        config.telegram.api_hash = Some(api_hash);
    }
    if let Some(phone) = get(ENV_PHONE_NUMBER) {
        config.telegram.phone_number = Some(phone);
    }
    if let Some(path) = get(ENV_ARCHIVE_PATH) {
        config.backend.archive_path = Some(PathBuf::from(path));
    }
}

/// Create default configuration file if it doesn't exist.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists() -> Result<PathBuf> {
    let config_path = config_file_path();

    if !config_path.exists() {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create config directory", e))?;
        }

        fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| AppError::io("Failed to create default config", e))?;

        tracing::info!(path = %config_path.display(), "Created default configuration");
    }

    Ok(config_path)
}

/// Get the path to the configuration file.
#[must_use]
pub fn config_file_path() -> PathBuf {
    AppConfig::config_file_path()
}
