//! Client facade
//!
//! [`Client`] owns one transport session at a time and wraps it with bounded
//! connect retry, connection state tracking, per-call QoS and retain policy,
//! and encode-on-publish / decode-on-deliver through a [`Codec`].
//!
//! # Example
//!
//! ```no_run
//! use mqtt_session::{Client, ClientConfig, Message};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let client: Client = Client::new(ClientConfig::new("tcp://localhost:1883", "t1"))?;
//! client.start().await?;
//!
//! client
//!     .subscribe("x/y", |topic: &str, message: Message| {
//!         println!("{topic}: {}", message.content);
//!     })
//!     .await?;
//!
//! let message = Message::new("device", "twin", "Read", json!({}));
//! client.publish("x/y", &message).await?;
//! client.close().await;
//! # Ok::<(), mqtt_session::ClientError>(())
//! # });
//! ```

pub mod retry;
pub mod state;

pub use retry::{Backoff, RetryPolicy};
pub use state::{ConnectionState, ConnectionStateMachine};

use crate::codec::{Codec, JsonCodec};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::observability::ClientMetrics;
use crate::transport::mqtt::MqttConnector;
use crate::transport::{ConnectionObserver, Connector, MessageCallback, Session, SessionOptions};
use bytes::Bytes;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn, Instrument};

/// Drain bound handed to the transport on close
pub const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Publish/subscribe client for one logical broker connection
///
/// All operations take `&self`; share a client across tasks with `Arc`.
pub struct Client<M = crate::protocol::Message, C = JsonCodec<M>> {
    config: ClientConfig,
    codec: Arc<C>,
    connector: Arc<dyn Connector>,
    session: RwLock<Option<Arc<dyn Session>>>,
    lifecycle: Mutex<()>,
    state: Arc<ConnectionStateMachine>,
    metrics: Arc<ClientMetrics>,
    _message: PhantomData<fn() -> M>,
}

impl<M, C> std::fmt::Debug for Client<M, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.config.client_id)
            .field("broker_url", &self.config.broker_url)
            .field("state", &self.state.current())
            .finish()
    }
}

impl<M> Client<M, JsonCodec<M>>
where
    JsonCodec<M>: Codec<M>,
    M: Send + Sync + 'static,
{
    /// Client using the MQTT transport and the JSON codec
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_codec(config, Arc::new(JsonCodec::new()))
    }
}

impl<M, C> Client<M, C>
where
    C: Codec<M>,
    M: Send + Sync + 'static,
{
    /// Client using the MQTT transport and a shared codec
    pub fn with_codec(config: ClientConfig, codec: Arc<C>) -> ClientResult<Self> {
        Self::with_connector(config, codec, Arc::new(MqttConnector))
    }

    /// Client with an explicit transport connector
    ///
    /// Zero-valued durations and depths are replaced by their defaults, then
    /// the configuration is validated. No network I/O happens here.
    pub fn with_connector(
        config: ClientConfig,
        codec: Arc<C>,
        connector: Arc<dyn Connector>,
    ) -> ClientResult<Self> {
        let config = config.with_defaults_applied();
        config.validate()?;

        let metrics = Arc::new(ClientMetrics::new());
        let state = Arc::new(ConnectionStateMachine::new(
            config.client_id.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            codec,
            connector,
            session: RwLock::new(None),
            lifecycle: Mutex::new(()),
            state,
            metrics,
            _message: PhantomData,
        })
    }

    /// Create a fresh transport session and connect it with bounded retry
    ///
    /// Any previous session is closed first. After `retry.max_attempts`
    /// failures the client is left `Disconnected` and `start` may be called
    /// again.
    pub async fn start(&self) -> ClientResult<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let observer: Arc<dyn ConnectionObserver> = self.state.clone();
        let options = SessionOptions::from_config(&self.config, observer)?;

        if let Some(previous) = self.take_session() {
            debug!(client_id = %self.config.client_id, "Closing previous session");
            previous.close(CLOSE_DRAIN_TIMEOUT).await;
        }

        let session = self
            .connector
            .create(options)
            .map_err(|source| ClientError::ConnectFailed {
                attempts: 0,
                source,
            })?;

        let policy = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.metrics.connect_attempted();

            let span = crate::connect_span!(
                client_id = %self.config.client_id,
                broker_url = %self.config.broker_url,
                attempt = attempt
            );
            let result = session.connect().instrument(span).await;

            match result {
                Ok(()) => {
                    info!(
                        client_id = %self.config.client_id,
                        broker_url = %self.config.broker_url,
                        attempt,
                        "Session started"
                    );
                    *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
                    return Ok(());
                }
                Err(source) => {
                    self.metrics.connect_failed();

                    if !policy.should_retry(attempt) {
                        error!(
                            client_id = %self.config.client_id,
                            attempts = attempt,
                            error = %source,
                            "Giving up on broker connection"
                        );
                        session.close(CLOSE_DRAIN_TIMEOUT).await;
                        return Err(ClientError::ConnectFailed {
                            attempts: attempt,
                            source,
                        });
                    }

                    let delay = policy.delay_for(attempt);
                    warn!(
                        client_id = %self.config.client_id,
                        attempt,
                        max_attempts = policy.max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %source,
                        "Connect attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Encode `message` and publish it with the configured QoS and retain flag
    ///
    /// Fails with [`ClientError::EmptyMessage`] for `None`, then with
    /// [`ClientError::NotConnected`] before the codec is touched.
    pub async fn publish<'a>(
        &self,
        topic: &str,
        message: impl Into<Option<&'a M>>,
    ) -> ClientResult<()>
    where
        M: 'a,
    {
        let message = message.into().ok_or(ClientError::EmptyMessage)?;
        let session = self.connected_session()?;
        let payload = self
            .codec
            .encode(message)
            .map_err(ClientError::EncodeFailed)?;

        let span = crate::session_span!(
            client_id = %self.config.client_id,
            operation = "publish",
            topic = %topic
        );
        let result = session
            .publish(topic, self.config.qos, self.config.retain, payload)
            .instrument(span)
            .await;

        match result {
            Ok(()) => {
                self.metrics.message_published();
                debug!(client_id = %self.config.client_id, topic = %topic, "Message published");
                Ok(())
            }
            Err(source) => {
                self.metrics.publish_failed();
                warn!(
                    client_id = %self.config.client_id,
                    topic = %topic,
                    error = %source,
                    "Publish failed"
                );
                Err(ClientError::PublishFailed {
                    topic: topic.to_string(),
                    source,
                })
            }
        }
    }

    /// Deliver decoded messages on topics matching `filter` to `handler`
    ///
    /// Payloads that fail to decode are logged, counted and dropped; the
    /// subscription stays active.
    pub async fn subscribe<F>(&self, filter: &str, handler: F) -> ClientResult<()>
    where
        F: Fn(&str, M) + Send + Sync + 'static,
    {
        let session = self.connected_session()?;
        let callback = self.delivery_adapter(handler);

        let span = crate::session_span!(
            client_id = %self.config.client_id,
            operation = "subscribe",
            filter = %filter
        );
        session
            .subscribe(filter, self.config.qos, callback)
            .instrument(span)
            .await
            .map_err(|source| ClientError::SubscribeFailed {
                filter: filter.to_string(),
                source,
            })?;

        info!(client_id = %self.config.client_id, filter = %filter, qos = %self.config.qos, "Subscribed");
        Ok(())
    }

    /// Remove the subscription for `filter`
    pub async fn unsubscribe(&self, filter: &str) -> ClientResult<()> {
        let session = self.connected_session()?;

        let span = crate::session_span!(
            client_id = %self.config.client_id,
            operation = "unsubscribe",
            filter = %filter
        );
        session
            .unsubscribe(filter)
            .instrument(span)
            .await
            .map_err(|source| ClientError::UnsubscribeFailed {
                filter: filter.to_string(),
                source,
            })?;

        info!(client_id = %self.config.client_id, filter = %filter, "Unsubscribed");
        Ok(())
    }

    /// Gracefully disconnect the current session
    ///
    /// The state moves to `Disconnected` through the transport's loss
    /// notification, not here.
    pub async fn close(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(session) = self.take_session() {
            session.close(CLOSE_DRAIN_TIMEOUT).await;
            info!(client_id = %self.config.client_id, "Session closed");
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.current()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Receiver that observes every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Cause recorded by the most recent connection loss
    pub fn last_lost_cause(&self) -> Option<String> {
        self.state.last_cause()
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn take_session(&self) -> Option<Arc<dyn Session>> {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Current session if both the tracked state and the transport report
    /// an open connection
    fn connected_session(&self) -> ClientResult<Arc<dyn Session>> {
        if self.state.current() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let session = self
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ClientError::NotConnected)?;
        if !session.is_connection_open() {
            return Err(ClientError::NotConnected);
        }
        Ok(session)
    }

    fn delivery_adapter<F>(&self, handler: F) -> MessageCallback
    where
        F: Fn(&str, M) + Send + Sync + 'static,
    {
        let codec = self.codec.clone();
        let metrics = self.metrics.clone();
        let client_id = self.config.client_id.clone();

        Arc::new(move |topic: &str, payload: Bytes| match codec.decode(&payload) {
            Ok(message) => {
                metrics.message_delivered();
                handler(topic, message);
            }
            Err(e) => {
                metrics.decode_failed();
                warn!(
                    client_id = %client_id,
                    topic = %topic,
                    payload_len = payload.len(),
                    error = %e,
                    "Dropping payload that failed to decode"
                );
            }
        })
    }
}
