//! Configuration loader for Flowline.
//!
//! Reads `config.toml` from the data directory (`~/.flowline/` by default)
//! and deserializes it into [`FlowlineConfig`]. Falls back to defaults when
//! the file is missing or malformed.

use std::path::{Path, PathBuf};

use flowline_types::config::FlowlineConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "FLOWLINE_DATA_DIR";

/// Resolve the data directory: `$FLOWLINE_DATA_DIR`, else `~/.flowline`.
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".flowline")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults.
/// - Unreadable or unparsable file: logs a warning and returns defaults.
pub async fn load_config(data_dir: &Path) -> FlowlineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return FlowlineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return FlowlineConfig::default();
        }
    };

    match toml::from_str::<FlowlineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            FlowlineConfig::default()
        }
    }
}

/// The SQLite URL for a data directory: `sqlite://{data_dir}/flowline.db?mode=rwc`.
pub fn default_database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("flowline.db").display())
}

/// The configured database URL, or the default for the data directory.
pub fn database_url(config: &FlowlineConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| default_database_url(data_dir))
}
