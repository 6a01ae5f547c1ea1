//! MQTT client I/O
//!
//! [`MqttClient`] owns a rumqttc client plus a supervisor task that polls the
//! event loop, tracks connection state, forwards inbound publishes and rebuilds
//! the connection with backoff after failures.

use super::connection::{
    configure_mqtt_options, generate_client_id, qos_from_level, ConnectionState, MqttError,
    ReconnectConfig,
};
use super::health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
use super::message_handler::{EventRoute, MessageForwarder, MessageHandler};
use crate::config::MqttSection;
use crate::transport::{InboundMessage, Transport};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the request channel between `AsyncClient` and its event loop
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Time allowed for a DISCONNECT to be flushed before the supervisor is stopped
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// MQTT transport with automatic reconnection
pub struct MqttClient {
    client_id: String,
    config: MqttSection,
    qos: QoS,
    client: Arc<Mutex<AsyncClient>>,
    event_loop: Mutex<Option<EventLoop>>,
    reconnect_config: ReconnectConfig,
    subscriptions: Arc<Mutex<Vec<String>>>,
    forwarder: Arc<Mutex<MessageForwarder>>,
    closing: Arc<AtomicBool>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    supervisor: Option<JoinHandle<()>>,
}

impl MqttClient {
    /// Create a client whose id is `client_prefix` plus a random suffix
    ///
    /// Nothing touches the network until [`MqttClient::connect`].
    pub fn new(client_prefix: &str, config: MqttSection) -> Result<Self, MqttError> {
        let client_id = generate_client_id(client_prefix);
        let qos = qos_from_level(config.qos)?;
        let options = configure_mqtt_options(&client_id, &config)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        Ok(Self {
            client_id,
            config,
            qos,
            client: Arc::new(Mutex::new(client)),
            event_loop: Mutex::new(Some(event_loop)),
            reconnect_config: ReconnectConfig::default(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            forwarder: Arc::new(Mutex::new(MessageForwarder::new())),
            closing: Arc::new(AtomicBool::new(false)),
            state_rx: None,
            shutdown_tx: None,
            supervisor: None,
        })
    }

    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn broker_url(&self) -> &str {
        &self.config.broker_url
    }

    /// Start the supervisor and wait for the broker's ConnAck
    ///
    /// Transient failures while waiting are retried with backoff; the call
    /// fails once reconnection is exhausted or the timeout elapses.
    pub async fn connect(&mut self) -> Result<(), MqttError> {
        let event_loop = self
            .event_loop
            .get_mut()
            .take()
            .ok_or_else(|| MqttError::ConnectionFailed("client already started".to_string()))?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let supervisor = Supervisor {
            client_id: self.client_id.clone(),
            config: self.config.clone(),
            qos: self.qos,
            client: self.client.clone(),
            state_tx,
            shutdown_rx,
            reconnect_config: self.reconnect_config.clone(),
            subscriptions: self.subscriptions.clone(),
            forwarder: self.forwarder.clone(),
            closing: self.closing.clone(),
            attempts: 0,
        };
        let span = crate::mqtt_span!(
            client_id = %self.client_id,
            broker = %self.config.broker_url
        );
        self.supervisor = Some(tokio::spawn(supervisor.run(event_loop).instrument(span)));
        self.state_rx = Some(state_rx.clone());
        self.shutdown_tx = Some(shutdown_tx);

        let timeout = HealthMonitor::connection_timeout(&self.reconnect_config);
        match wait_for_connection(state_rx, timeout).await {
            Ok(()) => {
                info!(
                    client_id = %self.client_id,
                    broker = %self.config.broker_url,
                    "Connected to MQTT broker"
                );
                Ok(())
            }
            Err(e) => {
                self.stop_supervisor().await;
                Err(e)
            }
        }
    }

    /// Send DISCONNECT and stop the supervisor
    pub async fn disconnect(&mut self) -> Result<(), MqttError> {
        self.closing.store(true, Ordering::SeqCst);

        let sent = {
            let client = self.client.lock().await;
            client.disconnect().await
        };
        if let Err(e) = sent {
            debug!(error = %e, "DISCONNECT could not be queued");
        }

        if let Some(handle) = self.supervisor.as_mut() {
            if tokio::time::timeout(DISCONNECT_GRACE, handle).await.is_ok() {
                self.supervisor = None;
            }
        }
        self.stop_supervisor().await;

        info!(client_id = %self.client_id, "MQTT client disconnected");
        Ok(())
    }

    async fn stop_supervisor(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.supervisor.take() {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "MQTT supervisor ended with error");
                }
            }
        }
    }

    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    pub fn is_permanently_disconnected(&self) -> bool {
        matches!(
            self.connection_state(),
            Some(ConnectionState::PermanentlyDisconnected(_))
        )
    }

    fn ensure_connected(&self) -> Result<(), MqttError> {
        let state = self
            .connection_state()
            .unwrap_or(ConnectionState::Disconnected("never connected".to_string()));
        if HealthMonitor::can_publish(&state) {
            Ok(())
        } else {
            Err(MqttError::NotConnected { state })
        }
    }

    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        self.ensure_connected()?;

        let client = self.client.lock().await;
        client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed {
                topic: topic.to_string(),
                source: Box::new(e),
            })?;

        debug!(topic = %topic, "Published");
        Ok(())
    }

    /// Subscribe and remember the filter for re-subscription after reconnects
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        self.ensure_connected()?;

        {
            let client = self.client.lock().await;
            client
                .subscribe(topic, self.qos)
                .await
                .map_err(|e| MqttError::SubscriptionFailed {
                    topic: topic.to_string(),
                    source: Box::new(e),
                })?;
        }

        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.iter().any(|t| t == topic) {
            subscriptions.push(topic.to_string());
        }

        info!(topic = %topic, "Subscribed");
        Ok(())
    }

    pub async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        self.forwarder.lock().await.set_sender(sender);
    }
}

/// Wait until the state is Connected, or fail on permanent disconnection/timeout
async fn wait_for_connection(
    mut state_rx: watch::Receiver<ConnectionState>,
    timeout: Duration,
) -> Result<(), MqttError> {
    let settled = tokio::time::timeout(
        timeout,
        state_rx.wait_for(|state| {
            matches!(
                state,
                ConnectionState::Connected | ConnectionState::PermanentlyDisconnected(_)
            )
        }),
    )
    .await;

    match settled {
        Err(_) => Err(MqttError::ConnectionFailed(format!(
            "no ConnAck within {}s",
            timeout.as_secs()
        ))),
        Ok(Err(_)) => Err(MqttError::ConnectionFailed(
            "connection supervisor stopped".to_string(),
        )),
        Ok(Ok(state)) => match &*state {
            ConnectionState::Connected => Ok(()),
            other => Err(MqttError::NotConnected {
                state: other.clone(),
            }),
        },
    }
}

/// Background task that owns the event loop
struct Supervisor {
    client_id: String,
    config: MqttSection,
    qos: QoS,
    client: Arc<Mutex<AsyncClient>>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    subscriptions: Arc<Mutex<Vec<String>>>,
    forwarder: Arc<Mutex<MessageForwarder>>,
    closing: Arc<AtomicBool>,
    attempts: u32,
}

impl Supervisor {
    async fn run(mut self, mut event_loop: EventLoop) {
        debug!("MQTT supervisor started");

        loop {
            let polled = tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
                polled = event_loop.poll() => polled,
            };

            let keep_running = match polled {
                Ok(event) => {
                    let route = MessageHandler::route_mqtt_event(&event);
                    self.handle_route(route, &mut event_loop).await
                }
                Err(e) if self.closing.load(Ordering::SeqCst) => {
                    debug!(error = %e, "Event loop closed during disconnect");
                    false
                }
                Err(e) => {
                    self.transition(ConnectionEvent::NetworkError(e.to_string()));
                    self.reconnect(&mut event_loop).await
                }
            };

            if !keep_running {
                break;
            }
        }

        if self.closing.load(Ordering::SeqCst) {
            self.transition(ConnectionEvent::ClosedByClient);
        }
        debug!("MQTT supervisor stopped");
    }

    async fn handle_route(&mut self, route: EventRoute, event_loop: &mut EventLoop) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                self.attempts = 0;
                self.transition(ConnectionEvent::ConnAckReceived);
                self.resubscribe().await;
                true
            }
            EventRoute::MessageReceived { topic, payload } => {
                debug!(topic = %topic, bytes = payload.len(), "Message received");
                self.forwarder
                    .lock()
                    .await
                    .forward(InboundMessage::new(topic, payload));
                true
            }
            EventRoute::Disconnected => {
                self.transition(ConnectionEvent::DisconnectedByBroker);
                if self.closing.load(Ordering::SeqCst) {
                    return false;
                }
                self.reconnect(event_loop).await
            }
            EventRoute::SubscriptionConfirmed { packet_id, failed } => {
                if failed {
                    warn!(packet_id, "Broker refused subscription");
                } else {
                    debug!(packet_id, "Subscription confirmed");
                }
                true
            }
            EventRoute::InfrastructureEvent(event) => {
                debug!(event = %event, "MQTT event");
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    /// Back off, then swap in a fresh client and event loop
    ///
    /// Returns false when the supervisor should stop.
    async fn reconnect(&mut self, event_loop: &mut EventLoop) -> bool {
        let decision = HealthMonitor::should_attempt_reconnection(
            self.attempts,
            &self.reconnect_config,
            *self.shutdown_rx.borrow(),
        );

        match decision {
            ReconnectionDecision::Proceed { attempt, delay_ms } => {
                self.attempts = attempt;
                self.transition(ConnectionEvent::ReconnectionStarted(attempt));
                info!(attempt, delay_ms, "Scheduling MQTT reconnection");

                if !self.sleep_unless_shutdown(Duration::from_millis(delay_ms)).await {
                    return false;
                }

                match configure_mqtt_options(&self.client_id, &self.config) {
                    Ok(options) => {
                        let (client, fresh_loop) =
                            AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
                        *event_loop = fresh_loop;
                        *self.client.lock().await = client;
                        true
                    }
                    Err(e) => {
                        self.transition(ConnectionEvent::PermanentFailure(e.to_string()));
                        false
                    }
                }
            }
            ReconnectionDecision::AbortShutdownRequested => false,
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                self.transition(ConnectionEvent::PermanentFailure(format!(
                    "max reconnection attempts ({}) exceeded",
                    self.attempts
                )));
                false
            }
        }
    }

    async fn sleep_unless_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            changed = self.shutdown_rx.changed() => {
                changed.is_ok() && !*self.shutdown_rx.borrow()
            }
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn resubscribe(&self) {
        let topics = self.subscriptions.lock().await.clone();
        if topics.is_empty() {
            return;
        }

        let client = self.client.lock().await;
        for topic in &topics {
            // try_subscribe: the event loop is not being polled while this runs
            match client.try_subscribe(topic.as_str(), self.qos) {
                Ok(()) => debug!(topic = %topic, "Re-subscribed"),
                Err(e) => error!(topic = %topic, error = %e, "Failed to re-subscribe"),
            }
        }
    }

    fn transition(&self, event: ConnectionEvent) {
        let next = HealthMonitor::next_state(event);
        let previous = self.state_tx.borrow().clone();
        if previous != next {
            HealthMonitor::log_transition(&previous, &next);
        }
        let _ = self.state_tx.send(next);
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttClient::connect(self).await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        MqttClient::disconnect(self).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        MqttClient::publish(self, topic, payload).await
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        MqttClient::subscribe(self, topic).await
    }

    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        MqttClient::set_message_sender(self, sender).await
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        MqttClient::connection_state(self)
    }

    fn is_permanently_disconnected(&self) -> bool {
        MqttClient::is_permanently_disconnected(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
    }
}
