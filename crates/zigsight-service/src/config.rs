//! Server configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use zigsight_core::{AnalyticsConfig, Error as CoreError};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Which telemetry source feeds the store.
    pub source: SourceConfig,
    /// Zigbee2MQTT broker settings.
    pub mqtt: MqttConfig,
    /// Device registry settings.
    pub registry: RegistryConfig,
    /// Analytics thresholds and weights.
    pub analytics: AnalyticsConfig,
    /// Channel advisor settings.
    pub advisor: AdvisorConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// Only the settings of the selected telemetry source are checked, so a
    /// registry deployment does not need a valid broker URL.
    ///
    /// # Example
    ///
    /// ```
    /// use zigsight_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        match self.source.kind {
            SourceKind::Zigbee2mqtt => errors.extend(self.mqtt.validate()),
            SourceKind::Registry => errors.extend(self.registry.validate()),
        }
        if let Err(e) = self.analytics.validate() {
            let message = match e {
                CoreError::InvalidConfig(message) => message,
                other => other.to_string(),
            };
            errors.push(ValidationError {
                field: "analytics".to_string(),
                message,
            });
        }
        errors.extend(self.advisor.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
    /// Capacity of the device event channel.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            broadcast_buffer: DEFAULT_BROADCAST_BUFFER,
        }
    }
}

/// Default capacity of the device event channel.
pub const DEFAULT_BROADCAST_BUFFER: usize = 100;

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                }),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError {
                        field: "server.bind".to_string(),
                        message: "port cannot be 0".to_string(),
                    }),
                    Err(_) => errors.push(ValidationError {
                        field: "server.bind".to_string(),
                        message: format!("invalid port '{}': must be a number 1-65535", port),
                    }),
                    Ok(_) => {}
                },
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError {
                field: "server.broadcast_buffer".to_string(),
                message: "broadcast buffer must be at least 1".to_string(),
            });
        }

        errors
    }
}

/// Telemetry source selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
}

/// Available telemetry sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Zigbee2MQTT messages over an MQTT broker.
    #[default]
    Zigbee2mqtt,
    /// A polled HTTP device registry.
    Registry,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Zigbee2mqtt => "zigbee2mqtt",
            SourceKind::Registry => "registry",
        }
    }
}

/// MQTT subscriber configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker URL (`mqtt://host:port` or `mqtts://host:port`).
    pub broker: String,
    /// Zigbee2MQTT base topic.
    pub topic_prefix: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "mqtt://localhost:1883".to_string(),
            topic_prefix: "zigbee2mqtt".to_string(),
            client_id: "zigsight".to_string(),
            username: None,
            password: None,
            keep_alive: 60,
        }
    }
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("broker", &self.broker)
            .field("topic_prefix", &self.topic_prefix)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

impl MqttConfig {
    /// Validate MQTT configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(self.broker.starts_with("mqtt://") || self.broker.starts_with("mqtts://")) {
            errors.push(ValidationError {
                field: "mqtt.broker".to_string(),
                message: format!(
                    "invalid broker URL '{}': must start with mqtt:// or mqtts://",
                    self.broker
                ),
            });
        }

        let prefix = self.topic_prefix.trim_matches('/');
        if prefix.is_empty() {
            errors.push(ValidationError {
                field: "mqtt.topic_prefix".to_string(),
                message: "topic prefix cannot be empty".to_string(),
            });
        } else if prefix.contains(['#', '+']) {
            errors.push(ValidationError {
                field: "mqtt.topic_prefix".to_string(),
                message: "topic prefix cannot contain MQTT wildcards".to_string(),
            });
        }

        if self.client_id.is_empty() {
            errors.push(ValidationError {
                field: "mqtt.client_id".to_string(),
                message: "client id cannot be empty".to_string(),
            });
        }

        if self.username.is_some() != self.password.is_some() {
            errors.push(ValidationError {
                field: "mqtt.username".to_string(),
                message: "username and password must be set together".to_string(),
            });
        }

        if self.keep_alive < MIN_KEEP_ALIVE {
            errors.push(ValidationError {
                field: "mqtt.keep_alive".to_string(),
                message: format!(
                    "keep alive {} is too short (minimum {} seconds)",
                    self.keep_alive, MIN_KEEP_ALIVE
                ),
            });
        }

        errors
    }
}

/// Minimum MQTT keep-alive in seconds.
pub const MIN_KEEP_ALIVE: u64 = 5;

/// Device registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Endpoint returning the device map.
    pub url: String,
    /// Poll interval in seconds.
    pub poll_interval: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123/api/zha/devices".to_string(),
            poll_interval: 60,
        }
    }
}

/// Minimum poll interval in seconds (10 seconds).
pub const MIN_POLL_INTERVAL: u64 = 10;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;

impl RegistryConfig {
    /// Validate registry configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "registry.url".to_string(),
                message: format!(
                    "invalid registry URL '{}': must start with http:// or https://",
                    self.url
                ),
            });
        }

        if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "registry.poll_interval".to_string(),
                message: format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            });
        } else if self.poll_interval > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "registry.poll_interval".to_string(),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds / 1 hour)",
                    self.poll_interval, MAX_POLL_INTERVAL
                ),
            });
        }

        errors
    }
}

/// Channel advisor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    /// Number of issued recommendations kept.
    pub history_size: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            history_size: zigsight_core::advisor::DEFAULT_HISTORY_SIZE,
        }
    }
}

impl AdvisorConfig {
    /// Validate advisor configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        if self.history_size == 0 {
            vec![ValidationError {
                field: "advisor.history_size".to_string(),
                message: "history size must be at least 1".to_string(),
            }]
        } else {
            Vec::new()
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
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
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `mqtt.broker`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zigsight")
        .join("server.toml")
}
