//! Configuration types for Flowline.
//!
//! `FlowlineConfig` is the top-level `config.toml` in the data directory.
//! Every section and field has a default so an empty file is valid.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowlineConfig {
    /// SQLite URL. `None` means `{data_dir}/flowline.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Capacity of the workflow event broadcast channel.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Default number of runs returned by run history queries.
    #[serde(default = "default_run_history_limit")]
    pub run_history_limit: u32,

    #[serde(default)]
    pub http: HttpActionConfig,

    #[serde(default)]
    pub storage: StorageActionConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_run_history_limit() -> u32 {
    50
}

impl Default for FlowlineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            event_bus_capacity: default_event_bus_capacity(),
            run_history_limit: default_run_history_limit(),
            http: HttpActionConfig::default(),
            storage: StorageActionConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Settings for the `network` action handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpActionConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "flowline-workflow/0.1".to_string()
}

impl Default for HttpActionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Settings for the `storage` action handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageActionConfig {
    /// Namespace used when a storage step does not name one.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Default for StorageActionConfig {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
        }
    }
}

/// Logging and trace export settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Bridge tracing spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
    /// Emit JSON log lines instead of human-readable ones.
    #[serde(default)]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = FlowlineConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.event_bus_capacity, 1024);
        assert_eq!(config.run_history_limit, 50);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.storage.default_namespace, "default");
        assert!(!config.telemetry.otel);
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: FlowlineConfig = toml::from_str("").unwrap();
        assert_eq!(config.run_history_limit, 50);
        assert_eq!(config.http.user_agent, "flowline-workflow/0.1");
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
database_url = "sqlite:///var/lib/flowline/runs.db"
run_history_limit = 20

[http]
timeout_secs = 5

[storage]
default_namespace = "orders"

[telemetry]
json_logs = true
"#;
        let config: FlowlineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.database_url.as_deref(),
            Some("sqlite:///var/lib/flowline/runs.db")
        );
        assert_eq!(config.run_history_limit, 20);
        assert_eq!(config.event_bus_capacity, 1024);
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.http.user_agent, "flowline-workflow/0.1");
        assert_eq!(config.storage.default_namespace, "orders");
        assert!(config.telemetry.json_logs);
        assert!(!config.telemetry.otel);
    }
}
