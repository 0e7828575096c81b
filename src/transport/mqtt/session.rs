//! rumqttc-backed transport session
//!
//! `connect` performs the CONNECT/CONNACK handshake on a fresh event loop and
//! then hands the loop to a supervisor task. The supervisor routes every
//! event through [`MessageHandler`], resolves acknowledgment waiters, queues
//! inbound messages for the dispatcher task and reconnects after failures
//! when a reconnect delay is configured.

use super::acks::{AckKind, AckTracker};
use super::connection::{configure_mqtt_options, map_connection_error, to_mqtt_qos};
use super::message_handler::{EventRoute, MessageHandler};
use crate::protocol::{validate_topic_filter, validate_topic_name, QosLevel};
use crate::transport::{
    ConnectionObserver, Connector, MessageCallback, Session, SessionError, SessionOptions,
    SubscriptionTable,
};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, EventLoop};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Creates [`MqttSession`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct MqttConnector;

impl Connector for MqttConnector {
    fn create(&self, options: SessionOptions) -> Result<Arc<dyn Session>, SessionError> {
        Ok(Arc::new(MqttSession::new(options)))
    }
}

/// Inbound message waiting for the dispatcher
struct Delivery {
    topic: String,
    payload: Bytes,
}

/// State shared between the session handle and its background tasks
struct Shared {
    client_id: String,
    client: Mutex<Option<AsyncClient>>,
    open: AtomicBool,
    acks: AckTracker,
    subscriptions: SubscriptionTable,
    /// Held while queueing a waiter and sending its request
    request_order: tokio::sync::Mutex<()>,
    observer: Arc<dyn ConnectionObserver>,
    ack_timeout: Duration,
}

impl Shared {
    fn client(&self) -> Option<AsyncClient> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mark_connected(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.observer.on_connect();
    }

    fn mark_lost(&self, cause: &str) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.observer.on_lost(cause);
        }
    }

    /// Final teardown once the event loop has stopped
    fn mark_closed(&self, cause: &str) {
        self.mark_lost(cause);
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.acks.fail_all(|| SessionError::Closed);
    }

    /// Send a request and wait for its acknowledgment
    async fn request<F, Fut>(&self, kind: AckKind, send: F) -> Result<(), SessionError>
    where
        F: FnOnce(AsyncClient) -> Fut,
        Fut: Future<Output = Result<(), rumqttc::ClientError>>,
    {
        if !self.open.load(Ordering::SeqCst) {
            return Err(SessionError::NotConnected);
        }
        let client = self.client().ok_or(SessionError::NotConnected)?;

        let receiver = {
            let _order = self.request_order.lock().await;
            let receiver = self.acks.enqueue(kind);
            match tokio::time::timeout(self.ack_timeout, send(client)).await {
                Ok(Ok(())) => receiver,
                Ok(Err(e)) => {
                    self.acks.cancel_last(kind);
                    return Err(SessionError::Request(e));
                }
                Err(_) => {
                    self.acks.cancel_last(kind);
                    return Err(SessionError::AckTimeout(self.ack_timeout));
                }
            }
        };

        match tokio::time::timeout(self.ack_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::AckTimeout(self.ack_timeout)),
        }
    }

    async fn subscribe_request(&self, filter: &str, qos: QosLevel) -> Result<(), SessionError> {
        let topic = filter.to_string();
        self.request(AckKind::Subscribe, |client| async move {
            client.subscribe(topic, to_mqtt_qos(qos)).await
        })
        .await
    }

    /// Restore registered filters after the broker reported no session
    async fn resubscribe_all(&self) {
        for (filter, qos) in self.subscriptions.filters() {
            match self.subscribe_request(&filter, qos).await {
                Ok(()) => debug!(client_id = %self.client_id, filter = %filter, "Re-subscribed"),
                Err(e) => {
                    error!(client_id = %self.client_id, filter = %filter, error = %e, "Failed to re-subscribe")
                }
            }
        }
    }

    /// Act on one routed event
    fn handle_route(self: &Arc<Self>, route: EventRoute) -> RouteOutcome {
        match route {
            EventRoute::ConnectionAcknowledged { session_present } => {
                info!(client_id = %self.client_id, session_present, "Reconnected to broker");
                self.mark_connected();
                if !session_present && !self.subscriptions.is_empty() {
                    let shared = Arc::clone(self);
                    tokio::spawn(async move { shared.resubscribe_all().await });
                }
                RouteOutcome::Continue
            }
            EventRoute::ConnectionRefused(code) => {
                warn!(client_id = %self.client_id, code = %code, "Broker refused connection");
                RouteOutcome::Continue
            }
            EventRoute::MessageReceived { topic, payload } => {
                RouteOutcome::Deliver(Delivery { topic, payload })
            }
            EventRoute::RequestSent { kind, pkid } => {
                self.acks.on_sent(kind, pkid);
                RouteOutcome::Continue
            }
            EventRoute::Acknowledged { kind, pkid } => {
                self.acks.complete(kind, pkid, Ok(()));
                RouteOutcome::Continue
            }
            EventRoute::SubscriptionRejected { pkid } => {
                self.acks.complete(
                    AckKind::Subscribe,
                    pkid,
                    Err(SessionError::SubscriptionRejected(format!("packet {pkid}"))),
                );
                RouteOutcome::Continue
            }
            EventRoute::Disconnected => {
                self.mark_lost("broker sent DISCONNECT");
                RouteOutcome::Continue
            }
            EventRoute::ClientDisconnecting => RouteOutcome::Stop,
            EventRoute::Infrastructure => RouteOutcome::Continue,
        }
    }
}

enum RouteOutcome {
    Continue,
    Deliver(Delivery),
    Stop,
}

/// Background tasks of a connected session
struct Tasks {
    event_loop: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Transport session over a rumqttc MQTT 3.1.1 connection
pub struct MqttSession {
    options: SessionOptions,
    shared: Arc<Shared>,
    tasks: Mutex<Option<Tasks>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl MqttSession {
    pub fn new(options: SessionOptions) -> Self {
        let shared = Arc::new(Shared {
            client_id: options.client_id.clone(),
            client: Mutex::new(None),
            open: AtomicBool::new(false),
            acks: AckTracker::new(),
            subscriptions: SubscriptionTable::new(),
            request_order: tokio::sync::Mutex::new(()),
            observer: options.observer.clone(),
            ack_timeout: options.ack_timeout,
        });

        Self {
            options,
            shared,
            tasks: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn take_tasks(&self) -> Option<Tasks> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Poll until CONNACK, bounded by the ping timeout
    async fn handshake(&self, event_loop: &mut EventLoop) -> Result<bool, SessionError> {
        let ping_timeout = self.options.ping_timeout;
        let result = tokio::time::timeout(ping_timeout, async {
            loop {
                let event = event_loop.poll().await.map_err(map_connection_error)?;
                match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged { session_present } => {
                        return Ok(session_present)
                    }
                    EventRoute::ConnectionRefused(code) => {
                        return Err(SessionError::ConnectionRefused(code))
                    }
                    _ => continue,
                }
            }
        })
        .await;

        result.unwrap_or(Err(SessionError::HandshakeTimeout(ping_timeout)))
    }

    /// Supervisor loop; owns the event loop until shutdown or a terminal error
    async fn run_event_loop(
        shared: Arc<Shared>,
        mut event_loop: EventLoop,
        deliveries: mpsc::Sender<Delivery>,
        mut shutdown_rx: watch::Receiver<bool>,
        reconnect_delay: Option<Duration>,
    ) {
        info!(client_id = %shared.client_id, "Starting MQTT event loop");

        let cause = loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break "session closed".to_string();
                    }
                }
                polled = event_loop.poll() => match polled {
                    Ok(event) => match shared.handle_route(MessageHandler::route_mqtt_event(&event)) {
                        RouteOutcome::Continue => {}
                        RouteOutcome::Deliver(delivery) => {
                            if deliveries.send(delivery).await.is_err() {
                                warn!(client_id = %shared.client_id, "Dispatcher stopped, dropping message");
                            }
                        }
                        RouteOutcome::Stop => break "disconnected by client".to_string(),
                    },
                    Err(e) => {
                        let session_error = map_connection_error(e);
                        error!(client_id = %shared.client_id, error = %session_error, "MQTT event loop error");
                        shared.mark_lost(&session_error.to_string());

                        let Some(delay) = reconnect_delay else {
                            break session_error.to_string();
                        };
                        debug!(client_id = %shared.client_id, delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
                        if !interruptible_sleep(&mut shutdown_rx, delay).await {
                            break "session closed".to_string();
                        }
                    }
                }
            }
        };

        shared.mark_closed(&cause);
        info!(client_id = %shared.client_id, cause = %cause, "MQTT event loop stopped");
    }

    /// Invoke callbacks for each delivery in arrival order
    async fn run_dispatcher(shared: Arc<Shared>, mut deliveries: mpsc::Receiver<Delivery>) {
        while let Some(delivery) = deliveries.recv().await {
            let callbacks = shared.subscriptions.matching(&delivery.topic);
            if callbacks.is_empty() {
                debug!(client_id = %shared.client_id, topic = %delivery.topic, "No subscription matches topic");
            }
            for callback in callbacks {
                callback(&delivery.topic, delivery.payload.clone());
            }
        }
    }
}

/// Sleep unless shutdown is signalled; returns false on shutdown
async fn interruptible_sleep(shutdown_rx: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
        _ = tokio::time::sleep(delay) => true,
    }
}

#[async_trait]
impl Session for MqttSession {
    async fn connect(&self) -> Result<(), SessionError> {
        let _connecting = self.connect_lock.lock().await;
        if self.is_connection_open() {
            return Ok(());
        }
        if let Some(stale) = self.take_tasks() {
            let _ = stale.shutdown_tx.send(true);
            stale.event_loop.abort();
            stale.dispatcher.abort();
        }

        let mqtt_options = configure_mqtt_options(&self.options);
        let capacity = self.options.message_cache_depth.max(1);
        let (client, mut event_loop) = AsyncClient::new(mqtt_options, capacity);

        let session_present = self.handshake(&mut event_loop).await?;
        info!(
            client_id = %self.options.client_id,
            host = %self.options.address.host,
            port = self.options.address.port,
            session_present,
            "Connected to MQTT broker"
        );

        *self
            .shared
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(client);
        self.shared.mark_connected();

        let (delivery_tx, delivery_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(Self::run_dispatcher(self.shared.clone(), delivery_rx));
        let event_loop = tokio::spawn(Self::run_event_loop(
            self.shared.clone(),
            event_loop,
            delivery_tx,
            shutdown_rx,
            self.options.reconnect_delay,
        ));

        *self.tasks.lock().unwrap_or_else(PoisonError::into_inner) = Some(Tasks {
            event_loop,
            dispatcher,
            shutdown_tx,
        });
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
        let topic = topic.to_string();
        self.shared
            .request(AckKind::Publish, |client| async move {
                client
                    .publish_bytes(topic, to_mqtt_qos(qos), retain, payload)
                    .await
            })
            .await
    }

    async fn subscribe(
        &self,
        filter: &str,
        qos: QosLevel,
        callback: MessageCallback,
    ) -> Result<(), SessionError> {
        validate_topic_filter(filter)?;
        if !self.is_connection_open() {
            return Err(SessionError::NotConnected);
        }

        let replaced = self.shared.subscriptions.insert(filter, qos, callback);
        match self.shared.subscribe_request(filter, qos).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.shared.subscriptions.restore(filter, replaced);
                Err(match e {
                    SessionError::SubscriptionRejected(_) => {
                        SessionError::SubscriptionRejected(filter.to_string())
                    }
                    other => other,
                })
            }
        }
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), SessionError> {
        validate_topic_filter(filter)?;
        let topic = filter.to_string();
        self.shared
            .request(AckKind::Unsubscribe, |client| async move {
                client.unsubscribe(topic).await
            })
            .await?;
        self.shared.subscriptions.remove(filter);
        Ok(())
    }

    async fn close(&self, drain_timeout: Duration) {
        let Some(tasks) = self.take_tasks() else {
            return;
        };

        if let Some(client) = self.shared.client() {
            match tokio::time::timeout(drain_timeout, client.disconnect()).await {
                Ok(Ok(())) => debug!(client_id = %self.options.client_id, "DISCONNECT queued"),
                Ok(Err(e)) => warn!(client_id = %self.options.client_id, error = %e, "Failed to queue DISCONNECT"),
                Err(_) => warn!(client_id = %self.options.client_id, "Timed out queueing DISCONNECT"),
            }
        }

        let Tasks {
            mut event_loop,
            dispatcher,
            shutdown_tx,
        } = tasks;

        if tokio::time::timeout(drain_timeout, &mut event_loop).await.is_err() {
            warn!(client_id = %self.options.client_id, "Event loop did not stop within drain timeout, aborting");
            let _ = shutdown_tx.send(true);
            event_loop.abort();
            self.shared.mark_closed("session closed");
        }

        if tokio::time::timeout(drain_timeout, dispatcher).await.is_err() {
            debug!(client_id = %self.options.client_id, "Dispatcher still draining after close");
        }
    }

    fn is_connection_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(tasks) = self.take_tasks() {
            let _ = tasks.shutdown_tx.send(true);
            tasks.event_loop.abort();
            tasks.dispatcher.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingObserver {
        connects: AtomicUsize,
        losses: AtomicUsize,
    }

    impl ConnectionObserver for CountingObserver {
        fn on_connect(&self) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }

        fn on_lost(&self, _cause: &str) {
            self.losses.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session_for(broker_url: &str, observer: Arc<CountingObserver>) -> MqttSession {
        let mut config = ClientConfig::new(broker_url, "session-test");
        config.ping_timeout_secs = 2;
        config.ack_timeout_secs = 1;
        MqttSession::new(SessionOptions::from_config(&config, observer).unwrap())
    }

    #[tokio::test]
    async fn test_new_session_is_not_open() {
        let observer = Arc::new(CountingObserver::default());
        let session = session_for("tcp://127.0.0.1:1", observer.clone());

        assert!(!session.is_connection_open());
        assert_eq!(observer.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_operations_before_connect_fail_fast() {
        let observer = Arc::new(CountingObserver::default());
        let session = session_for("tcp://127.0.0.1:1", observer);

        let publish = session
            .publish("x/y", QosLevel::AtLeastOnce, false, Bytes::from_static(b"{}"))
            .await;
        assert!(matches!(publish, Err(SessionError::NotConnected)));

        let callback: MessageCallback = Arc::new(|_: &str, _: Bytes| {});
        let subscribe = session.subscribe("x/#", QosLevel::AtLeastOnce, callback).await;
        assert!(matches!(subscribe, Err(SessionError::NotConnected)));
        assert!(session.shared.subscriptions.is_empty());

        assert!(matches!(
            session.unsubscribe("x/#").await,
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_invalid_topics_rejected_before_io() {
        let observer = Arc::new(CountingObserver::default());
        let session = session_for("tcp://127.0.0.1:1", observer);

        let result = session
            .publish("x/#", QosLevel::AtMostOnce, false, Bytes::new())
            .await;
        assert!(matches!(result, Err(SessionError::InvalidTopic(_))));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let observer = Arc::new(CountingObserver::default());
        let session = session_for("tcp://127.0.0.1:1", observer.clone());

        let result = session.connect().await;
        assert!(matches!(
            result,
            Err(SessionError::Connection(_)) | Err(SessionError::HandshakeTimeout(_))
        ));
        assert!(!session.is_connection_open());
        assert_eq!(observer.connects.load(Ordering::SeqCst), 0);
        assert_eq!(observer.losses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_without_connect_is_noop() {
        let observer = Arc::new(CountingObserver::default());
        let session = session_for("tcp://127.0.0.1:1", observer.clone());

        session.close(Duration::from_millis(250)).await;
        assert_eq!(observer.losses.load(Ordering::SeqCst), 0);
    }

    /// Give `shared` a request channel whose event loop is never polled
    fn attach_client(shared: &Shared) -> EventLoop {
        let (client, event_loop) =
            AsyncClient::new(rumqttc::MqttOptions::new("session-test", "127.0.0.1", 1), 10);
        *shared.client.lock().unwrap() = Some(client);
        event_loop
    }

    async fn wait_for_pending(shared: &Shared, expected: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while shared.acks.pending() != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("pending waiter count not reached");
    }

    #[tokio::test]
    async fn test_connack_and_disconnect_drive_observer() {
        let observer = Arc::new(CountingObserver::default());
        let shared = session_for("tcp://127.0.0.1:1", observer.clone()).shared.clone();

        let outcome = shared.handle_route(EventRoute::ConnectionAcknowledged {
            session_present: true,
        });
        assert!(matches!(outcome, RouteOutcome::Continue));
        assert!(shared.open.load(Ordering::SeqCst));
        assert_eq!(observer.connects.load(Ordering::SeqCst), 1);

        shared.handle_route(EventRoute::Disconnected);
        shared.handle_route(EventRoute::Disconnected);
        assert!(!shared.open.load(Ordering::SeqCst));
        assert_eq!(observer.losses.load(Ordering::SeqCst), 1);

        shared.handle_route(EventRoute::ConnectionAcknowledged {
            session_present: true,
        });
        assert_eq!(observer.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_routes_deliver_and_stop() {
        let observer = Arc::new(CountingObserver::default());
        let shared = session_for("tcp://127.0.0.1:1", observer).shared.clone();

        let outcome = shared.handle_route(EventRoute::MessageReceived {
            topic: "x/y".to_string(),
            payload: Bytes::from_static(b"{}"),
        });
        assert!(matches!(outcome, RouteOutcome::Deliver(ref d) if d.topic == "x/y"));

        assert!(matches!(
            shared.handle_route(EventRoute::ClientDisconnecting),
            RouteOutcome::Stop
        ));
        assert!(matches!(
            shared.handle_route(EventRoute::Infrastructure),
            RouteOutcome::Continue
        ));
    }

    #[tokio::test]
    async fn test_publish_waits_for_matching_ack() {
        let observer = Arc::new(CountingObserver::default());
        let shared = session_for("tcp://127.0.0.1:1", observer).shared.clone();
        let _event_loop = attach_client(&shared);
        shared.mark_connected();

        let request = tokio::spawn({
            let shared = shared.clone();
            async move {
                shared
                    .request(AckKind::Publish, |client| async move {
                        client
                            .publish("x/y", rumqttc::QoS::AtLeastOnce, false, b"{}".to_vec())
                            .await
                    })
                    .await
            }
        });
        wait_for_pending(&shared, 1).await;

        shared.handle_route(EventRoute::RequestSent {
            kind: AckKind::Publish,
            pkid: 3,
        });
        shared.handle_route(EventRoute::Acknowledged {
            kind: AckKind::Subscribe,
            pkid: 3,
        });
        assert_eq!(shared.acks.pending(), 1);

        shared.handle_route(EventRoute::Acknowledged {
            kind: AckKind::Publish,
            pkid: 3,
        });
        assert!(request.await.unwrap().is_ok());
        assert_eq!(shared.acks.pending(), 0);
    }

    #[tokio::test]
    async fn test_rejected_suback_fails_subscribe() {
        let observer = Arc::new(CountingObserver::default());
        let shared = session_for("tcp://127.0.0.1:1", observer).shared.clone();
        let _event_loop = attach_client(&shared);
        shared.mark_connected();

        let request = tokio::spawn({
            let shared = shared.clone();
            async move {
                shared
                    .subscribe_request("x/#", QosLevel::AtLeastOnce)
                    .await
            }
        });
        wait_for_pending(&shared, 1).await;

        shared.handle_route(EventRoute::RequestSent {
            kind: AckKind::Subscribe,
            pkid: 4,
        });
        shared.handle_route(EventRoute::SubscriptionRejected { pkid: 4 });

        assert!(matches!(
            request.await.unwrap(),
            Err(SessionError::SubscriptionRejected(_))
        ));
        assert_eq!(shared.acks.pending(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_without_session_resubscribes() {
        let observer = Arc::new(CountingObserver::default());
        let shared = session_for("tcp://127.0.0.1:1", observer.clone()).shared.clone();
        let _event_loop = attach_client(&shared);
        shared
            .subscriptions
            .insert("sensors/#", QosLevel::AtLeastOnce, Arc::new(|_: &str, _: Bytes| {}));

        shared.handle_route(EventRoute::ConnectionAcknowledged {
            session_present: false,
        });
        assert_eq!(observer.connects.load(Ordering::SeqCst), 1);
        wait_for_pending(&shared, 1).await;

        shared.handle_route(EventRoute::RequestSent {
            kind: AckKind::Subscribe,
            pkid: 9,
        });
        shared.handle_route(EventRoute::Acknowledged {
            kind: AckKind::Subscribe,
            pkid: 9,
        });
        assert_eq!(shared.acks.pending(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_with_session_skips_resubscribe() {
        let observer = Arc::new(CountingObserver::default());
        let shared = session_for("tcp://127.0.0.1:1", observer).shared.clone();
        let _event_loop = attach_client(&shared);
        shared
            .subscriptions
            .insert("sensors/#", QosLevel::AtLeastOnce, Arc::new(|_: &str, _: Bytes| {}));

        shared.handle_route(EventRoute::ConnectionAcknowledged {
            session_present: true,
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(shared.acks.pending(), 0);
    }

    #[tokio::test]
    async fn test_mark_closed_fails_pending_waiters() {
        let observer = Arc::new(CountingObserver::default());
        let shared = session_for("tcp://127.0.0.1:1", observer.clone()).shared.clone();
        let _event_loop = attach_client(&shared);
        shared.mark_connected();

        let request = tokio::spawn({
            let shared = shared.clone();
            async move { shared.subscribe_request("x/y", QosLevel::AtMostOnce).await }
        });
        wait_for_pending(&shared, 1).await;

        shared.mark_closed("session closed");

        assert!(matches!(request.await.unwrap(), Err(SessionError::Closed)));
        assert_eq!(observer.losses.load(Ordering::SeqCst), 1);
        assert!(shared.client().is_none());
    }

    #[test]
    fn test_connector_creates_session() {
        let mut config = ClientConfig::new("tcp://127.0.0.1:1883", "t1");
        config.ping_timeout_secs = 1;
        let options =
            SessionOptions::from_config(&config, Arc::new(CountingObserver::default())).unwrap();
        let session = MqttConnector.create(options).unwrap();
        assert!(!session.is_connection_open());
    }
}
