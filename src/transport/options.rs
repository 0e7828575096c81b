//! Connection options handed to a transport session

use super::ConnectionObserver;
use crate::config::{
    BrokerAddress, ClientConfig, ConfigError, Credentials, LastWillConfig, PersistenceMode,
    TlsSection,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// TLS settings resolved from disk
#[derive(Clone, PartialEq)]
pub enum TlsMaterial {
    /// Verify the broker against the platform root store
    DefaultRoots,
    /// Verify against `ca`, optionally presenting a client certificate
    Custom {
        ca: Vec<u8>,
        client_auth: Option<(Vec<u8>, Vec<u8>)>,
    },
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsMaterial::DefaultRoots => f.write_str("DefaultRoots"),
            TlsMaterial::Custom { ca, client_auth } => f
                .debug_struct("Custom")
                .field("ca_bytes", &ca.len())
                .field("client_auth", &client_auth.is_some())
                .finish(),
        }
    }
}

impl TlsMaterial {
    /// Read the files named by `section`
    pub fn load(section: &TlsSection) -> Result<Self, ConfigError> {
        let Some(ca_file) = &section.ca_file else {
            return Ok(TlsMaterial::DefaultRoots);
        };

        let ca = read_file("tls.ca_file", ca_file)?;
        let client_auth = match (&section.cert_file, &section.key_file) {
            (Some(cert), Some(key)) => Some((
                read_file("tls.cert_file", cert)?,
                read_file("tls.key_file", key)?,
            )),
            _ => None,
        };

        Ok(TlsMaterial::Custom { ca, client_auth })
    }
}

fn read_file(field: &str, path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|e| {
        ConfigError::InvalidConfig(format!("Failed to read {field} '{}': {e}", path.display()))
    })
}

/// Everything a session needs to reach the broker
#[derive(Clone)]
pub struct SessionOptions {
    pub client_id: String,
    pub address: BrokerAddress,
    pub credentials: Option<Credentials>,
    pub keep_alive: Duration,
    pub ping_timeout: Duration,
    pub clean_session: bool,
    pub persistence: PersistenceMode,
    pub last_will: Option<LastWillConfig>,
    pub tls: Option<TlsMaterial>,
    pub message_cache_depth: usize,
    pub ack_timeout: Duration,
    /// Delay before each automatic reconnect; `None` disables reconnecting
    pub reconnect_delay: Option<Duration>,
    pub observer: Arc<dyn ConnectionObserver>,
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("client_id", &self.client_id)
            .field("address", &self.address)
            .field("credentials", &self.credentials)
            .field("keep_alive", &self.keep_alive)
            .field("ping_timeout", &self.ping_timeout)
            .field("clean_session", &self.clean_session)
            .field("persistence", &self.persistence)
            .field("last_will", &self.last_will)
            .field("tls", &self.tls)
            .field("message_cache_depth", &self.message_cache_depth)
            .field("ack_timeout", &self.ack_timeout)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish_non_exhaustive()
    }
}

impl SessionOptions {
    /// Resolve credentials and TLS material from `config`
    ///
    /// A TLS scheme without a `[tls]` section verifies against the platform
    /// roots.
    pub fn from_config(
        config: &ClientConfig,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Self, ConfigError> {
        let address = config.broker_address()?;
        let tls = match &config.tls {
            Some(section) => Some(TlsMaterial::load(section)?),
            None if address.tls => Some(TlsMaterial::DefaultRoots),
            None => None,
        };

        Ok(Self {
            client_id: config.client_id.clone(),
            address,
            credentials: config.credentials()?,
            keep_alive: config.keep_alive(),
            ping_timeout: config.ping_timeout(),
            clean_session: config.clean_session,
            persistence: config.persistence.clone(),
            last_will: config.last_will.clone(),
            tls,
            message_cache_depth: config.message_cache_depth,
            ack_timeout: config.ack_timeout(),
            reconnect_delay: config.reconnect_delay(),
            observer,
        })
    }
}
