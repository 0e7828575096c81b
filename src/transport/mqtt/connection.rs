//! Translation of session options into rumqttc settings

use super::super::{SessionError, SessionOptions, TlsMaterial};
use crate::config::PersistenceMode;
use crate::protocol::QosLevel;
use rumqttc::{ConnectionError, LastWill, MqttOptions, QoS, TlsConfiguration, Transport};
use std::time::Duration;
use tracing::{info, warn};

/// Largest packet accepted or sent
pub const MAX_PACKET_SIZE: usize = 256 * 1024;

/// rumqttc rejects keep-alive intervals below this
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

pub fn to_mqtt_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Build rumqttc options for one connection
pub fn configure_mqtt_options(options: &SessionOptions) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(
        options.client_id.clone(),
        options.address.host.clone(),
        options.address.port,
    );

    mqtt_options.set_keep_alive(options.keep_alive.max(MIN_KEEP_ALIVE));
    mqtt_options.set_clean_session(options.clean_session);
    mqtt_options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    if let Some(credentials) = &options.credentials {
        mqtt_options.set_credentials(credentials.username.clone(), credentials.password.clone());
    }

    if let Some(will) = &options.last_will {
        mqtt_options.set_last_will(LastWill::new(
            will.topic.clone(),
            will.payload.clone().into_bytes(),
            to_mqtt_qos(will.qos),
            will.retained,
        ));
    }

    if let Some(tls) = &options.tls {
        info!(client_id = %options.client_id, "SSL/TLS is enabled");
        mqtt_options.set_transport(tls_transport(tls));
    }

    if let PersistenceMode::File { path } = &options.persistence {
        warn!(
            client_id = %options.client_id,
            path = %path.display(),
            "File persistence is not supported by this transport, keeping in-flight state in memory"
        );
    }

    mqtt_options
}

fn tls_transport(tls: &TlsMaterial) -> Transport {
    match tls {
        TlsMaterial::DefaultRoots => Transport::tls_with_default_config(),
        TlsMaterial::Custom { ca, client_auth } => Transport::Tls(TlsConfiguration::Simple {
            ca: ca.clone(),
            alpn: None,
            client_auth: client_auth.clone(),
        }),
    }
}

/// Classify an event loop failure
pub fn map_connection_error(error: ConnectionError) -> SessionError {
    match error {
        ConnectionError::ConnectionRefused(code) => {
            SessionError::ConnectionRefused(format!("{code:?}"))
        }
        ConnectionError::Tls(e) => SessionError::Tls(e.to_string()),
        other => SessionError::Connection(other.to_string()),
    }
}
