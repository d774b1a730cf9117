//! TOML configuration for the `insen-client` binary
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! timeout_ms = 1000
//!
//! [poll]
//! controller_id = 0
//! interval_ms = 16
//! enabled = true
//!
//! [client]
//! event_capacity = 256
//! request_info_on_ready = true
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every section and key is optional.

use crate::client::ClientSettings;
use crate::protocol::ControllerId;
use crate::transport::SerialSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn, Level};

const CONFIG_DIR: &str = "insen-client";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid log level {0:?}")]
    InvalidLevel(String),
}

/// Where a loaded [`ClientConfig`] came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at this path; defaults were used
    Missing(PathBuf),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub serial: SerialSettings,
    pub poll: PollSettings,
    pub client: ClientSettings,
    pub logging: LoggingSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PollSettings {
    pub controller_id: ControllerId,
    pub interval_ms: u64,
    pub enabled: bool,
    /// Exit after this many seconds; run until Ctrl-C when unset
    pub stop_after_secs: Option<u64>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            controller_id: 0,
            interval_ms: 16,
            enabled: true,
            stop_after_secs: None,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stop_after(&self) -> Option<Duration> {
        self.stop_after_secs.map(Duration::from_secs)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    /// One of `trace`, `debug`, `info`, `warn`, `error`
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingSettings {
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.level.trim()).map_err(|_| ConfigError::InvalidLevel(self.level.clone()))
    }
}

impl ClientConfig {
    /// `<config_dir>/insen-client/config.toml`, falling back to the working directory
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Load from `path`, or from [`default_path`](Self::default_path) when `None`
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is an
    /// error. Nothing is logged here since this usually runs before logging is
    /// set up; the returned [`ConfigSource`] says where the values came from.
    pub async fn load(path: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
        if !exists {
            return Ok((Self::default(), ConfigSource::Missing(path)));
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;

        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        Ok((config, ConfigSource::File(path)))
    }

    /// Log where the configuration came from and what it holds
    pub fn log_source(&self, source: &ConfigSource) {
        match source {
            ConfigSource::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigSource::Missing(path) => warn!(
                "Config file {} does not exist, using defaults",
                path.display()
            ),
        }
        debug!("Configuration: {:?}", self);
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.poll.interval(), Duration::from_millis(16));
        assert!(config.client.request_info_on_ready);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = ClientConfig::from_toml(
            r#"
            [serial]
            port = "COM7"

            [poll]
            controller_id = 2
            stop_after_secs = 30

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "COM7");
        assert_eq!(config.serial.timeout_ms, 1000);
        assert_eq!(config.poll.controller_id, 2);
        assert_eq!(config.poll.interval_ms, 16);
        assert_eq!(config.poll.stop_after(), Some(Duration::from_secs(30)));
        assert_eq!(config.logging.max_level().unwrap(), Level::DEBUG);
    }

    #[test]
    fn test_malformed_file_is_rejected() {
        assert!(ClientConfig::from_toml("[poll]\ninterval_ms = \"fast\"").is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let logging = LoggingSettings {
            level: "loud".into(),
        };
        assert!(matches!(
            logging.max_level(),
            Err(ConfigError::InvalidLevel(_))
        ));
    }

    #[test]
    fn test_written_config_loads_back() {
        let mut config = ClientConfig::default();
        config.poll.enabled = false;
        let text = config.to_toml().unwrap();
        assert_eq!(ClientConfig::from_toml(&text).unwrap(), config);
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("insen-client-test-does-not-exist.toml");
        let (config, source) = ClientConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(source, ConfigSource::Missing(path));
    }

    #[tokio::test]
    async fn test_existing_file_is_reported_as_source() {
        let path = std::env::temp_dir().join(format!(
            "insen-client-test-{}.toml",
            std::process::id()
        ));
        tokio::fs::write(&path, "[poll]\ncontroller_id = 5\n")
            .await
            .unwrap();

        let loaded = ClientConfig::load(Some(&path)).await;
        tokio::fs::remove_file(&path).await.unwrap();

        let (config, source) = loaded.unwrap();
        assert_eq!(config.poll.controller_id, 5);
        assert_eq!(source, ConfigSource::File(path));
    }

    #[tokio::test]
    async fn test_load_does_not_log() {
        // A subscriber that panics on any event catches logging before setup
        struct Forbid;
        impl tracing::Subscriber for Forbid {
            fn enabled(&self, _: &tracing::Metadata<'_>) -> bool {
                true
            }
            fn new_span(&self, _: &tracing::span::Attributes<'_>) -> tracing::span::Id {
                tracing::span::Id::from_u64(1)
            }
            fn record(&self, _: &tracing::span::Id, _: &tracing::span::Record<'_>) {}
            fn record_follows_from(&self, _: &tracing::span::Id, _: &tracing::span::Id) {}
            fn event(&self, event: &tracing::Event<'_>) {
                panic!("unexpected log event from {}", event.metadata().target());
            }
            fn enter(&self, _: &tracing::span::Id) {}
            fn exit(&self, _: &tracing::span::Id) {}
        }

        let path = std::env::temp_dir().join("insen-client-test-no-log.toml");
        let _guard = tracing::subscriber::set_default(Forbid);
        let (_, source) = ClientConfig::load(Some(&path)).await.unwrap();
        assert!(matches!(source, ConfigSource::Missing(_)));
    }
}
