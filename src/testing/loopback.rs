//! In-memory broker and transport
//!
//! [`LoopbackBroker`] stands in for a real broker. Sessions created through
//! its [`LoopbackConnector`] deliver every publish synchronously to all open
//! sessions with a matching subscription. The broker can be told to refuse
//! connections, fail publishes, reject subscriptions, inject raw payloads and
//! drop or restore connections.

use crate::protocol::{validate_topic_filter, validate_topic_name, QosLevel};
use crate::transport::{
    Connector, MessageCallback, Session, SessionError, SessionOptions, SubscriptionTable,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

/// A publish the broker accepted
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRecord {
    pub client_id: String,
    pub topic: String,
    pub qos: QosLevel,
    pub retain: bool,
    pub payload: Bytes,
}

struct BrokerState {
    reachable: AtomicBool,
    refuse_next: AtomicU32,
    connect_attempts: AtomicU32,
    sessions_created: AtomicU32,
    fail_publishes: AtomicBool,
    reject_subscriptions: AtomicBool,
    published: Mutex<Vec<PublishedRecord>>,
    sessions: Mutex<Vec<Weak<SessionCore>>>,
}

impl BrokerState {
    fn live_sessions(&self) -> Vec<Arc<SessionCore>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|weak| weak.strong_count() > 0);
        sessions.iter().filter_map(Weak::upgrade).collect()
    }

    fn route(&self, topic: &str, payload: &Bytes) {
        for session in self.live_sessions() {
            if !session.open.load(Ordering::SeqCst) {
                continue;
            }
            for callback in session.subscriptions.matching(topic) {
                callback(topic, payload.clone());
            }
        }
    }
}

/// Handle to an in-memory broker; clones share state
#[derive(Clone)]
pub struct LoopbackBroker {
    state: Arc<BrokerState>,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState {
                reachable: AtomicBool::new(true),
                refuse_next: AtomicU32::new(0),
                connect_attempts: AtomicU32::new(0),
                sessions_created: AtomicU32::new(0),
                fail_publishes: AtomicBool::new(false),
                reject_subscriptions: AtomicBool::new(false),
                published: Mutex::new(Vec::new()),
                sessions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A broker that refuses every connection
    pub fn unreachable() -> Self {
        let broker = Self::new();
        broker.set_reachable(false);
        broker
    }

    pub fn connector(&self) -> Arc<LoopbackConnector> {
        Arc::new(LoopbackConnector {
            state: self.state.clone(),
        })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Refuse the next `count` connection attempts
    pub fn fail_next_connects(&self, count: u32) {
        self.state.refuse_next.store(count, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_created(&self) -> u32 {
        self.state.sessions_created.load(Ordering::SeqCst)
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.state.fail_publishes.store(fail, Ordering::SeqCst);
    }

    pub fn reject_subscriptions(&self, reject: bool) {
        self.state.reject_subscriptions.store(reject, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedRecord> {
        self.state
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deliver `payload` on `topic` without going through a client or codec
    pub fn inject_raw(&self, topic: &str, payload: impl Into<Bytes>) {
        self.state.route(topic, &payload.into());
    }

    /// Drop every open connection, reporting `cause` to each session observer
    pub fn drop_connections(&self, cause: &str) {
        for session in self.state.live_sessions() {
            if !session.closed.load(Ordering::SeqCst) && session.open.swap(false, Ordering::SeqCst) {
                session.options.observer.on_lost(cause);
            }
        }
    }

    /// Re-establish dropped connections that were not closed by their client
    pub fn restore_connections(&self) {
        for session in self.state.live_sessions() {
            if session.ever_connected.load(Ordering::SeqCst)
                && !session.closed.load(Ordering::SeqCst)
                && !session.open.swap(true, Ordering::SeqCst)
            {
                session.options.observer.on_connect();
            }
        }
    }

    /// Repeat the connect notification for every open session
    pub fn renotify_connected(&self) {
        for session in self.state.live_sessions() {
            if session.open.load(Ordering::SeqCst) {
                session.options.observer.on_connect();
            }
        }
    }
}

/// Creates sessions attached to a [`LoopbackBroker`]
pub struct LoopbackConnector {
    state: Arc<BrokerState>,
}

impl Connector for LoopbackConnector {
    fn create(&self, options: SessionOptions) -> Result<Arc<dyn Session>, SessionError> {
        let core = Arc::new(SessionCore {
            options,
            open: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            subscriptions: SubscriptionTable::new(),
        });

        self.state.sessions_created.fetch_add(1, Ordering::SeqCst);
        self.state
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&core));

        Ok(Arc::new(LoopbackSession {
            broker: self.state.clone(),
            core,
        }))
    }
}

struct SessionCore {
    options: SessionOptions,
    open: AtomicBool,
    ever_connected: AtomicBool,
    closed: AtomicBool,
    subscriptions: SubscriptionTable,
}

/// Session attached to a [`LoopbackBroker`]
pub struct LoopbackSession {
    broker: Arc<BrokerState>,
    core: Arc<SessionCore>,
}

impl LoopbackSession {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.core.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }
}

#[async_trait]
impl Session for LoopbackSession {
    async fn connect(&self) -> Result<(), SessionError> {
        self.broker.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.broker.reachable.load(Ordering::SeqCst) {
            return Err(SessionError::Connection(
                "loopback broker unreachable".to_string(),
            ));
        }
        let refused = self
            .broker
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SessionError::ConnectionRefused(
                "ServiceUnavailable".to_string(),
            ));
        }

        self.core.closed.store(false, Ordering::SeqCst);
        self.core.ever_connected.store(true, Ordering::SeqCst);
        if !self.core.open.swap(true, Ordering::SeqCst) {
            self.core.options.observer.on_connect();
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: QosLevel,
        retain: bool,
        payload: Bytes,
    ) -> Result<(), SessionError> {
        validate_topic_name(topic)?;
        self.ensure_open()?;
        if self.broker.fail_publishes.load(Ordering::SeqCst) {
            return Err(SessionError::AckTimeout(self.core.options.ack_timeout));
        }

        self.broker
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedRecord {
                client_id: self.core.options.client_id.clone(),
                topic: topic.to_string(),
                qos,
                retain,
                payload: payload.clone(),
            });
        self.broker.route(topic, &payload);
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        qos: QosLevel,
        callback: MessageCallback,
    ) -> Result<(), SessionError> {
        validate_topic_filter(filter)?;
        self.ensure_open()?;
        if self.broker.reject_subscriptions.load(Ordering::SeqCst) {
            return Err(SessionError::SubscriptionRejected(filter.to_string()));
        }
        self.core.subscriptions.insert(filter, qos, callback);
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), SessionError> {
        validate_topic_filter(filter)?;
        self.ensure_open()?;
        self.core.subscriptions.remove(filter);
        Ok(())
    }

    async fn close(&self, _drain_timeout: Duration) {
        self.core.closed.store(true, Ordering::SeqCst);
        if self.core.open.swap(false, Ordering::SeqCst) {
            self.core.options.observer.on_lost("session closed");
        }
    }

    fn is_connection_open(&self) -> bool {
        self.core.open.load(Ordering::SeqCst)
    }
}
