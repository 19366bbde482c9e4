// Copyright 2025 Cowboy AI, LLC.

//! Service settings
//!
//! [`AppConfig`] is read from TOML. Every section has defaults, so an empty
//! or missing file yields a server that runs in memory on localhost.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::args::Args;
use super::tenant::TenantConfig;
use crate::errors::DomainError;
use crate::expression::DEFAULT_EXPRESSION_TTL_SECS;
use crate::infrastructure::NatsConfig;
use crate::message::Topics;
use crate::saga::DEFAULT_SAGA_TIMEOUT_SECS;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`AppConfig`]
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed
        path: String,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for DomainError {
    fn from(err: ConfigError) -> Self {
        DomainError::ConfigurationError(err.to_string())
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the REST surface binds to
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Relational store settings
///
/// Without a URL every store is kept in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Postgres connection URL
    pub url: Option<String>,
    /// Pool size
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

/// Message bus settings
///
/// Without `enabled` events are recorded in memory and nothing is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Connect to NATS
    pub enabled: bool,
    /// Connection settings
    #[serde(flatten)]
    pub nats: NatsConfig,
}

/// Lifetimes of registry entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// How long an expression stays on a character
    pub expression_ttl_secs: u64,
    /// How long an invite waits for an answer
    pub invite_timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            expression_ttl_secs: DEFAULT_EXPRESSION_TTL_SECS as u64,
            invite_timeout_secs: 180,
        }
    }
}

/// Sweeper intervals in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// Expression expiry
    pub expression_interval_ms: u64,
    /// Invite timeout
    pub invite_interval_ms: u64,
    /// Ban expiry
    pub ban_interval_ms: u64,
    /// Saga timeout
    pub saga_interval_ms: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            expression_interval_ms: 50,
            invite_interval_ms: 10_000,
            ban_interval_ms: 60_000,
            saga_interval_ms: 30_000,
        }
    }
}

impl SweepSettings {
    fn intervals(&self) -> [(&'static str, u64); 4] {
        [
            ("expression_interval_ms", self.expression_interval_ms),
            ("invite_interval_ms", self.invite_interval_ms),
            ("ban_interval_ms", self.ban_interval_ms),
            ("saga_interval_ms", self.saga_interval_ms),
        ]
    }
}

/// Saga lifecycle settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SagaSettings {
    /// Active sagas older than this are failed and compensated
    pub timeout_secs: u64,
}

impl Default for SagaSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SAGA_TIMEOUT_SECS,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level used when `RUST_LOG` is unset
    pub level: String,
    /// JSON lines instead of human output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener
    pub server: ServerSettings,
    /// Relational store
    pub database: DatabaseSettings,
    /// Message bus
    pub bus: BusSettings,
    /// Logical topic name → subject overrides
    pub topics: HashMap<String, String>,
    /// Registry lifetimes
    pub registry: RegistrySettings,
    /// Sweeper intervals
    pub sweep: SweepSettings,
    /// Saga lifecycle
    pub saga: SagaSettings,
    /// Log output
    pub logging: LoggingSettings,
    /// Tenants served at startup
    #[serde(default, rename = "tenant")]
    pub tenants: Vec<TenantConfig>,
}

impl AppConfig {
    /// Read `path`; a missing file yields the defaults
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Configuration file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parse TOML text
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override topic subjects from environment variables named after them
    pub fn apply_env(&mut self) {
        let mut topics = Topics::with_overrides(&self.topics);
        topics.apply_env();
        for logical in crate::message::topics::ALL_TOPICS {
            let subject = topics.subject(logical);
            if subject != crate::message::topics::default_subject(logical) {
                self.topics.insert(logical.to_string(), subject);
            }
        }
    }

    /// Fold command-line flags over the file settings
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(bind) = &args.bind {
            self.server.bind = bind.clone();
        }
        if args.debug {
            self.logging.level = "debug".to_string();
        }
        if args.json_logs {
            self.logging.json = true;
        }
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {LOG_LEVELS:?}, got '{}'",
                self.logging.level
            )));
        }
        for (name, value) in self.sweep.intervals() {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("sweep.{name} must be positive")));
            }
        }
        if self.registry.expression_ttl_secs == 0 || self.registry.invite_timeout_secs == 0 {
            return Err(ConfigError::Invalid("registry lifetimes must be positive".to_string()));
        }
        if self.saga.timeout_secs == 0 {
            return Err(ConfigError::Invalid("saga.timeout_secs must be positive".to_string()));
        }
        if self.database.url.is_some() && self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed bind address
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server.bind '{}': {e}", self.server.bind)))
    }

    /// Topic resolution with the configured overrides
    pub fn topics(&self) -> Topics {
        Topics::with_overrides(&self.topics)
    }

    /// Expression time to live
    pub fn expression_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.registry.expression_ttl_secs as i64)
    }

    /// Invite answer timeout
    pub fn invite_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.invite_timeout_secs)
    }

    /// Saga timeout
    pub fn saga_timeout(&self) -> Duration {
        Duration::from_secs(self.saga.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::topics::EVENT_TOPIC_MAP_STATUS;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.registry.expression_ttl_secs, 5);
        assert_eq!(config.registry.invite_timeout_secs, 180);
        assert_eq!(config.saga.timeout_secs, 300);
        assert!(config.database.url.is_none());
        assert!(!config.bus.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind = "0.0.0.0:9000"

[bus]
enabled = true
url = "nats://bus:4222"

[topics]
EVENT_TOPIC_MAP_STATUS = "map.status.v2"

[logging]
json = true

[[tenant]]
id = "8f5c5e44-4d0f-4ad3-9d5a-2c1b4c6b1b77"
region = "GMS"
major = 83
minor = 1
"#
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(config.bus.enabled);
        assert_eq!(config.bus.nats.url, "nats://bus:4222");
        assert_eq!(config.bus.nats.consumer_group, "realm-server");
        assert_eq!(config.topics().subject(EVENT_TOPIC_MAP_STATUS), "map.status.v2");
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.tenants.len(), 1);
        assert_eq!(config.tenants[0].region, "GMS");
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nbind = ").unwrap();
        let err = AppConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.server.bind = "not an address".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sweep.ban_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ban_interval_ms"));
    }

    #[test]
    fn test_args_override_file() {
        let mut config = AppConfig::default();
        config.apply_args(&Args {
            bind: Some("0.0.0.0:1".to_string()),
            debug: true,
            json_logs: true,
            ..Args::default()
        });
        assert_eq!(config.server.bind, "0.0.0.0:1");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_config_error_becomes_domain_error() {
        let err: DomainError = ConfigError::Invalid("x".to_string()).into();
        assert!(matches!(err, DomainError::ConfigurationError(_)));
    }
}
