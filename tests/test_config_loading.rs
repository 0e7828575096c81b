//! Configuration loading and validation tests
//!
//! Tests focus on the behavior of loading TOML files and of rejecting bad
//! settings before any connection attempt.

use mqtt_session::testing::LoopbackBroker;
use mqtt_session::{
    Backoff, Client, ClientConfig, ClientError, ConfigError, JsonCodec, Message, PersistenceMode,
    QosLevel,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{contents}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
broker_url = "tcp://localhost:1883"
client_id = "edgeNode1"
qos = 1
retain = true
message_cache_depth = 50

[last_will]
topic = "devices/edgeNode1/status"
payload = "offline"
qos = 1
retained = true

[retry]
max_attempts = 3

[retry.backoff]
strategy = "exponential"
initial_ms = 100
multiplier = 2.0
max_ms = 1000
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.client_id, "edgeNode1");
    assert_eq!(config.qos, QosLevel::AtLeastOnce);
    assert!(config.retain);
    assert_eq!(config.message_cache_depth, 50);
    assert_eq!(config.last_will.as_ref().unwrap().payload, "offline");
    assert_eq!(config.retry.max_attempts, 3);
    assert!(matches!(config.retry.backoff, Backoff::Exponential { .. }));
    assert_eq!(config.retry.delay_for(3), Duration::from_millis(400));
}

#[test]
fn test_minimal_file_gets_construction_defaults() {
    let temp_file = write_config(
        r#"
broker_url = "mqtt://broker.local"
client_id = "t1"
"#,
    );

    let loaded = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(loaded, ClientConfig::new("mqtt://broker.local", "t1"));
    assert_eq!(loaded.persistence, PersistenceMode::Memory);
    assert_eq!(loaded.broker_address().unwrap().port, 1883);
}

#[test]
fn test_file_persistence_mode() {
    let temp_file = write_config(
        r#"
broker_url = "tcp://localhost:1883"
client_id = "t1"
persistence = { mode = "file", path = "/var/lib/mqtt-session" }
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.persistence,
        PersistenceMode::File {
            path: "/var/lib/mqtt-session".into()
        }
    );
}

#[test]
fn test_missing_file_is_file_read_error() {
    let result = ClientConfig::load_from_file(Path::new("/nonexistent/mqtt-session.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("broker_url = [unterminated");
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_qos_outside_range_is_rejected() {
    let temp_file = write_config(
        r#"
broker_url = "tcp://localhost:1883"
client_id = "t1"
qos = 3
"#,
    );
    assert!(ClientConfig::load_from_file(temp_file.path()).is_err());
}

#[test]
fn test_unsupported_scheme_is_rejected() {
    let temp_file = write_config(
        r#"
broker_url = "http://localhost:1883"
client_id = "t1"
"#,
    );
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_construction_rejects_missing_identity() {
    for (url, id) in [("", "t1"), ("tcp://localhost:1883", ""), ("tcp://localhost:1883", "  ")] {
        let result: Result<Client, _> = Client::new(ClientConfig::new(url, id));
        assert!(
            matches!(result, Err(ClientError::InvalidConfig(_))),
            "expected InvalidConfig for url={url:?} id={id:?}"
        );
    }
}

#[tokio::test]
async fn test_unreadable_ca_file_fails_start_before_connecting() {
    let broker = LoopbackBroker::new();
    let temp_file = write_config(
        r#"
broker_url = "mqtts://localhost"
client_id = "t1"

[tls]
ca_file = "/nonexistent/ca.pem"
"#,
    );
    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();
    assert!(config.uses_tls());

    let client: Client =
        Client::with_connector(config, Arc::new(JsonCodec::<Message>::new()), broker.connector())
            .unwrap();
    let err = client.start().await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidConfig(_)));
    assert!(!err.is_recoverable());
    assert_eq!(broker.connect_attempts(), 0);
}

#[tokio::test]
async fn test_missing_credential_env_fails_start() {
    let broker = LoopbackBroker::new();
    let mut config = ClientConfig::new("tcp://localhost:1883", "t1");
    config.username_env = Some("MQTT_SESSION_IT_MISSING_USER".to_string());

    let client: Client =
        Client::with_connector(config, Arc::new(JsonCodec::new()), broker.connector()).unwrap();
    let err = client.start().await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::InvalidConfig(ConfigError::EnvVarNotFound(_))
    ));
    assert_eq!(broker.sessions_created(), 0);
}
