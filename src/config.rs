//! Client configuration
//!
//! A [`ClientConfig`] is built in code with [`ClientConfig::new`] or loaded
//! from TOML with [`ClientConfig::load_from_file`]. Omitted keys take the
//! same defaults in both paths.

use crate::client::RetryPolicy;
use crate::protocol::{validate_topic_name, QosLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 120;
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MESSAGE_CACHE_DEPTH: usize = 100;
pub const DEFAULT_ACK_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Broker URL, e.g. `tcp://localhost:1883` or `mqtts://broker:8883`
    pub broker_url: String,
    /// Client identifier, unique per broker
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Environment variable holding the username
    #[serde(default)]
    pub username_env: Option<String>,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Bound on the connect handshake
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub clean_session: bool,
    #[serde(default)]
    pub persistence: PersistenceMode,
    #[serde(default)]
    pub last_will: Option<LastWillConfig>,
    #[serde(default)]
    pub tls: Option<TlsSection>,
    /// QoS applied to every publish and subscribe
    #[serde(default)]
    pub qos: QosLevel,
    /// Retain flag applied to every publish
    #[serde(default)]
    pub retain: bool,
    /// Inbound buffer depth
    #[serde(default = "default_message_cache_depth")]
    pub message_cache_depth: usize,
    /// Bound on each publish/subscribe/unsubscribe acknowledgment wait
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,
    /// Reconnect inside the transport after a connection loss
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Last-will message published by the broker on unclean disconnect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LastWillConfig {
    pub topic: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default = "default_will_qos")]
    pub qos: QosLevel,
    #[serde(default)]
    pub retained: bool,
}

/// TLS material
///
/// Without `ca_file` the platform root store is used. A client certificate
/// requires both `cert_file` and `key_file` as well as `ca_file`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TlsSection {
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

/// Where in-flight message state is kept
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PersistenceMode {
    #[default]
    Memory,
    File { path: PathBuf },
}

/// Resolved username/password pair
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parsed broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

fn default_keep_alive() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_ping_timeout() -> u64 {
    DEFAULT_PING_TIMEOUT_SECS
}

fn default_message_cache_depth() -> usize {
    DEFAULT_MESSAGE_CACHE_DEPTH
}

fn default_ack_timeout() -> u64 {
    DEFAULT_ACK_TIMEOUT_SECS
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_true() -> bool {
    true
}

fn default_will_qos() -> QosLevel {
    QosLevel::AtMostOnce
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Configuration with every optional setting at its default
    pub fn new(broker_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            client_id: client_id.into(),
            username: None,
            password: None,
            username_env: None,
            password_env: None,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            ping_timeout_secs: DEFAULT_PING_TIMEOUT_SECS,
            clean_session: true,
            persistence: PersistenceMode::Memory,
            last_will: None,
            tls: None,
            qos: QosLevel::default(),
            retain: false,
            message_cache_depth: DEFAULT_MESSAGE_CACHE_DEPTH,
            ack_timeout_secs: DEFAULT_ACK_TIMEOUT_SECS,
            auto_reconnect: true,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            retry: RetryPolicy::default(),
        }
    }

    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace zero durations and depths with their defaults
    pub fn with_defaults_applied(mut self) -> Self {
        if self.keep_alive_secs == 0 {
            self.keep_alive_secs = DEFAULT_KEEP_ALIVE_SECS;
        }
        if self.ping_timeout_secs == 0 {
            self.ping_timeout_secs = DEFAULT_PING_TIMEOUT_SECS;
        }
        if self.message_cache_depth == 0 {
            self.message_cache_depth = DEFAULT_MESSAGE_CACHE_DEPTH;
        }
        if self.ack_timeout_secs == 0 {
            self.ack_timeout_secs = DEFAULT_ACK_TIMEOUT_SECS;
        }
        self
    }

    /// Check every setting that can be checked without network I/O
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker_url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker_url must not be empty".to_string(),
            ));
        }
        validate_client_id(&self.client_id)?;
        self.broker_address()?;

        if let Some(tls) = &self.tls {
            if tls.cert_file.is_some() != tls.key_file.is_some() {
                return Err(ConfigError::InvalidConfig(
                    "tls.cert_file and tls.key_file must be set together".to_string(),
                ));
            }
            if tls.cert_file.is_some() && tls.ca_file.is_none() {
                return Err(ConfigError::InvalidConfig(
                    "tls client certificate requires tls.ca_file".to_string(),
                ));
            }
        }

        if let Some(will) = &self.last_will {
            validate_topic_name(&will.topic).map_err(|e| {
                ConfigError::InvalidConfig(format!("last_will.topic: {e}"))
            })?;
        }

        if let PersistenceMode::File { path } = &self.persistence {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "persistence path must not be empty".to_string(),
                ));
            }
        }

        self.retry.validate().map_err(ConfigError::InvalidConfig)
    }

    /// Parse `broker_url` into scheme, host, port and TLS flag
    pub fn broker_address(&self) -> Result<BrokerAddress, ConfigError> {
        let url = Url::parse(&self.broker_url).map_err(|e| {
            ConfigError::InvalidConfig(format!("Invalid broker URL '{}': {e}", self.broker_url))
        })?;

        let (tls, default_port) = match url.scheme() {
            "tcp" | "mqtt" => (false, 1883),
            "ssl" | "tls" | "mqtts" => (true, 8883),
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "Unsupported broker URL scheme '{other}'"
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| {
                ConfigError::InvalidConfig(format!(
                    "Broker URL '{}' has no host",
                    self.broker_url
                ))
            })?;

        Ok(BrokerAddress {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port().unwrap_or(default_port),
            tls,
        })
    }

    /// Resolve credentials from inline values or the named environment variables
    pub fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        let username = resolve(self.username.as_ref(), self.username_env.as_ref())?;
        let password = resolve(self.password.as_ref(), self.password_env.as_ref())?;

        Ok(username.map(|username| Credentials {
            username,
            password: password.unwrap_or_default(),
        }))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    /// Delay before each automatic reconnect, `None` when disabled
    pub fn reconnect_delay(&self) -> Option<Duration> {
        self.auto_reconnect
            .then(|| Duration::from_millis(self.reconnect_delay_ms))
    }

    /// Whether the connection will use TLS
    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
            || self
                .broker_address()
                .map(|address| address.tls)
                .unwrap_or(false)
    }
}

fn resolve(inline: Option<&String>, env_name: Option<&String>) -> Result<Option<String>, ConfigError> {
    if let Some(value) = inline {
        return Ok(Some(value.clone()));
    }
    match env_name {
        Some(name) => std::env::var(name)
            .map(Some)
            .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
        None => Ok(None),
    }
}

fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    if client_id.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "client_id must not be empty".to_string(),
        ));
    }
    if client_id.starts_with(char::is_whitespace) {
        return Err(ConfigError::InvalidConfig(format!(
            "client_id '{client_id}' must not start with whitespace"
        )));
    }
    Ok(())
}
