//! Configuration system for the sidecar server
//!
//! Loads configuration from:
//! 1. config.yaml - operational settings (listen address, store, execution, logging)
//! 2. .env file - loaded into the environment before anything else reads it
//!
//! Environment variables always override config.yaml values. A missing
//! config file means defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar { var: String, value: String },
}

/// Listen address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Columnar store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// DuckDB database file
    pub database: String,

    /// Schema holding the tables served over RPC
    pub schema: String,

    /// Table that must exist for health_check to report healthy
    pub health_table: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "data/sidecar.duckdb".to_string(),
            schema: "main".to_string(),
            health_table: None,
        }
    }
}

/// Query execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Push nearest-neighbour ordering down to the store's own distance
    /// function instead of ranking fetched rows in process
    pub native_vector_ordering: bool,

    /// Upper bound on rows fetched for in-process vector ranking
    pub max_vector_candidates: u64,

    /// Seconds a transaction may sit unused before it is rolled back;
    /// 0 keeps transactions until commit, rollback or shutdown
    pub transaction_idle_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            native_vector_ordering: false,
            max_vector_candidates: 10_000,
            transaction_idle_timeout_secs: 600,
        }
    }
}

impl ExecutionConfig {
    pub fn transaction_idle_timeout(&self) -> Option<Duration> {
        (self.transaction_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.transaction_idle_timeout_secs))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stdout, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub execution: ExecutionConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Path from `SIDECAR_CONFIG`, else `config.yaml`
    pub fn default_path() -> String {
        std::env::var("SIDECAR_CONFIG").unwrap_or_else(|_| "config.yaml".to_string())
    }

    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config: Config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Config::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("SIDECAR_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("SIDECAR_PORT")? {
            self.server.port = port;
        }

        if let Ok(database) = std::env::var("SIDECAR_DATABASE") {
            self.store.database = database;
        }
        if let Ok(schema) = std::env::var("SIDECAR_SCHEMA") {
            self.store.schema = schema;
        }
        if let Ok(table) = std::env::var("SIDECAR_HEALTH_TABLE") {
            self.store.health_table = Some(table).filter(|t| !t.is_empty());
        }

        if let Some(native) = parse_env("SIDECAR_NATIVE_VECTOR_ORDERING")? {
            self.execution.native_vector_ordering = native;
        }
        if let Some(max) = parse_env("SIDECAR_MAX_VECTOR_CANDIDATES")? {
            self.execution.max_vector_candidates = max;
        }
        if let Some(secs) = parse_env("SIDECAR_TRANSACTION_IDLE_TIMEOUT_SECS")? {
            self.execution.transaction_idle_timeout_secs = secs;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(output) = std::env::var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.logging.directory = dir;
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.store.database, "data/sidecar.duckdb");
        assert_eq!(config.store.schema, "main");
        assert_eq!(config.store.health_table, None);
        assert!(!config.execution.native_vector_ordering);
        assert_eq!(config.execution.max_vector_candidates, 10_000);
        assert_eq!(
            config.execution.transaction_idle_timeout(),
            Some(Duration::from_secs(600))
        );
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.logging.output, "stdout");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
store:
  database: "/var/lib/sidecar/media.duckdb"
execution:
  native_vector_ordering: true
"#,
        )
        .unwrap();

        assert_eq!(config.store.database, "/var/lib/sidecar/media.duckdb");
        assert_eq!(config.store.schema, "main");
        assert!(config.execution.native_vector_ordering);
        assert_eq!(config.execution.max_vector_candidates, 10_000);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config: Config =
            serde_yaml::from_str(include_str!("../../../config.yaml")).unwrap();
        let defaults = Config::default();

        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.store.database, defaults.store.database);
        assert_eq!(
            config.execution.max_vector_candidates,
            defaults.execution.max_vector_candidates
        );
        assert_eq!(
            config.execution.transaction_idle_timeout_secs,
            defaults.execution.transaction_idle_timeout_secs
        );
        assert_eq!(config.logging.directory, defaults.logging.directory);
    }

    // Single test for everything touching process env, so parallel tests
    // never observe each other's variables
    #[test]
    fn test_env_var_override() {
        let config_yaml = r#"
server:
  host: "127.0.0.1"
  port: 5000
store:
  database: "data/a.duckdb"
  schema: "main"
"#;
        let temp_file = std::env::temp_dir().join("sidecar_test_config.yaml");
        std::fs::write(&temp_file, config_yaml).unwrap();

        std::env::set_var("SIDECAR_PORT", "9090");
        std::env::set_var("SIDECAR_SCHEMA", "media");
        std::env::set_var("SIDECAR_MAX_VECTOR_CANDIDATES", "500");
        std::env::set_var("SIDECAR_TRANSACTION_IDLE_TIMEOUT_SECS", "0");

        let config = Config::load(&temp_file).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.store.schema, "media");
        assert_eq!(config.store.database, "data/a.duckdb");
        assert_eq!(config.execution.max_vector_candidates, 500);
        assert_eq!(config.execution.transaction_idle_timeout(), None);

        std::env::set_var("SIDECAR_PORT", "not-a-port");
        assert!(matches!(
            Config::load(&temp_file),
            Err(ConfigError::InvalidEnvVar { .. })
        ));

        std::env::remove_var("SIDECAR_PORT");
        std::env::remove_var("SIDECAR_SCHEMA");
        std::env::remove_var("SIDECAR_MAX_VECTOR_CANDIDATES");
        std::env::remove_var("SIDECAR_TRANSACTION_IDLE_TIMEOUT_SECS");
        std::fs::remove_file(&temp_file).ok();

        let missing = std::env::temp_dir().join("sidecar_no_such_config.yaml");
        let config = Config::load(&missing).unwrap();
        assert_eq!(config.server.port, 5000);
    }
}
