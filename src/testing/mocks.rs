//! Mock implementations for testing
//!
//! [`MockTransport`] records publishes and can inject inbound messages;
//! [`SpyStore`] records session lifecycle and inserted documents.

use crate::storage::{Document, DocumentStore, StorageError, StoreSession};
use crate::transport::mqtt::{ConnectionState, MqttError};
use crate::transport::{InboundMessage, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub type PublishedMessage = (String, Vec<u8>);

/// Mock transport for testing
#[derive(Debug)]
pub struct MockTransport {
    client_id: String,
    connected: AtomicBool,
    pub should_fail: bool,
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub subscriptions: Arc<Mutex<Vec<String>>>,
    sender: Mutex<Option<mpsc::Sender<InboundMessage>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            client_id: "mock-sensor-0001".to_string(),
            connected: AtomicBool::new(true),
            should_fail: false,
            published_messages: Arc::default(),
            subscriptions: Arc::default(),
            sender: Mutex::new(None),
        }
    }
}

impl MockTransport {
    /// A connected transport that accepts every publish
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_id(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            ..Default::default()
        }
    }

    /// A connected transport whose publishes fail
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn disconnected() -> Self {
        let transport = Self::default();
        transport.set_connected(false);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub async fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.clone()
    }

    /// Push a message to the registered listener as if it arrived from the bus
    pub async fn deliver(&self, topic: &str, payload: Vec<u8>) -> bool {
        let sender = self.sender.lock().await.clone();
        match sender {
            Some(sender) => sender
                .send(InboundMessage::new(topic, payload))
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Drop the registered listener so its receiver sees end-of-stream
    pub async fn close_listener(&self) {
        self.sender.lock().await.take();
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MqttError::ConnectionFailed("mock failure".to_string()));
        }
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.set_connected(false);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected {
                state: ConnectionState::Disconnected("mock".to_string()),
            });
        }
        if self.should_fail {
            return Err(MqttError::PublishFailed {
                topic: topic.to_string(),
                source: "mock publish failure".into(),
            });
        }

        self.published_messages
            .lock()
            .await
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.subscriptions.lock().await.push(topic.to_string());
        Ok(())
    }

    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        *self.sender.lock().await = Some(sender);
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        Some(if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected("mock".to_string())
        })
    }

    fn is_permanently_disconnected(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct SpyState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    inserted: Mutex<Vec<(String, Document)>>,
}

/// Document store that records how it is used
#[derive(Debug, Clone, Default)]
pub struct SpyStore {
    state: Arc<SpyState>,
    fail_sessions: bool,
    fail_inserts: bool,
    delay: Option<Duration>,
}

impl SpyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions open normally but every insert fails
    pub fn failing_inserts() -> Self {
        Self {
            fail_inserts: true,
            ..Default::default()
        }
    }

    /// Opening a session fails
    pub fn failing_sessions() -> Self {
        Self {
            fail_sessions: true,
            ..Default::default()
        }
    }

    /// Hold each insert for `delay` so overlapping sessions are observable
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub async fn inserted(&self) -> Vec<(String, Document)> {
        self.state.inserted.lock().await.clone()
    }
}

#[async_trait]
impl DocumentStore for SpyStore {
    type Session = SpySession;

    async fn open_session(&self) -> Result<Self::Session, StorageError> {
        if self.fail_sessions {
            return Err(StorageError::Connection("spy store refuses sessions".to_string()));
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);

        Ok(SpySession {
            state: Some(self.state.clone()),
            fail_inserts: self.fail_inserts,
            delay: self.delay,
        })
    }

    fn describe(&self) -> String {
        "spy://".to_string()
    }
}

pub struct SpySession {
    state: Option<Arc<SpyState>>,
    fail_inserts: bool,
    delay: Option<Duration>,
}

#[async_trait]
impl StoreSession for SpySession {
    async fn insert_one(
        &mut self,
        collection: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        let state = self.state.as_ref().ok_or(StorageError::SessionClosed)?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inserts {
            return Err(StorageError::Insert("spy insert failure".to_string()));
        }

        state
            .inserted
            .lock()
            .await
            .push((collection.to_string(), document.clone()));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        if let Some(state) = self.state.take() {
            state.active.fetch_sub(1, Ordering::SeqCst);
            state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
