//! Layered engine configuration.
//!
//! Sources, lowest precedence first: the embedded `default_config.yaml`,
//! `maintctl.yaml`, `.maintctl.yaml` (local override), an explicit file
//! passed by the caller, then `MAINT__SECTION__KEY` environment variables.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("../default_config.yaml");

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub import: ImportConfig,
    pub backup: BackupConfig,
    pub cache: CacheConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key_header: String,
    pub timeout_ms: u64,
    // Usually injected through MAINT__API__API_KEY
    #[serde(default, skip_serializing)]
    api_key: Option<String>,
}

impl ApiConfig {
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    pub storage_path: String,
    pub poll_interval_secs: u64,
    pub warning_threshold_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImportConfig {
    pub batch_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackupConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub stale_time_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DashboardConfig {
    pub low_stock_threshold: i32,
    pub top_machines: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    pub show_target: bool,
    pub show_file: bool,
    pub show_line: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
}

impl LoggingLevelsConfig {
    /// Most verbose enabled level as an `EnvFilter` directive.
    pub fn directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.info {
            "info"
        } else if self.warning {
            "warn"
        } else if self.error {
            "error"
        } else {
            "off"
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedactionConfig {
    #[serde(default = "true_default")]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<RedactionPattern>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: Vec::new(),
        }
    }
}

fn true_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedactionPattern {
    pub name: String,
    pub regex: String,
    pub placeholder: String,
}

impl EngineConfig {
    /// Load from the standard sources in the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from the standard sources plus an explicit override file.
    pub fn load_with(extra: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml))
            .add_source(File::with_name("maintctl.yaml").required(false))
            .add_source(File::with_name(".maintctl.yaml").required(false));

        if let Some(path) = extra {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix("MAINT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Embedded defaults only; no files, no environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::defaults().expect("embedded config must parse");
        assert_eq!(config.session.poll_interval_secs, 30);
        assert_eq!(config.session.warning_threshold_secs, 300);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.import.batch_delay_ms, 200);
        assert_eq!(config.api.api_key_header, "X-API-Key");
        assert!(config.api.api_key().is_none());
        assert_eq!(config.logging.levels.directive(), "info");
    }

    #[test]
    fn test_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.yaml");
        std::fs::write(&path, "api:\n  base_url: \"https://wartung.example\"\n").unwrap();
        let config = EngineConfig::load_with(Some(&path)).unwrap();
        assert_eq!(config.api.base_url, "https://wartung.example");
        // untouched sections keep their defaults
        assert_eq!(config.import.batch_delay_ms, 200);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("MAINT__API__API_KEY", "secret-key");
        std::env::set_var("MAINT__IMPORT__BATCH_DELAY_MS", "0");
        let config = EngineConfig::load();
        std::env::remove_var("MAINT__API__API_KEY");
        std::env::remove_var("MAINT__IMPORT__BATCH_DELAY_MS");

        let config = config.unwrap();
        assert_eq!(config.api.api_key(), Some("secret-key"));
        assert_eq!(config.import.batch_delay_ms, 0);
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = EngineConfig::defaults().unwrap();
        let api = config.api.with_api_key("k");
        let json = serde_json::to_value(&api).unwrap();
        assert!(json.get("api_key").is_none());
    }
}
