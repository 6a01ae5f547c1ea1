//! Publish/subscribe transport
//!
//! The [`Transport`] trait is the seam between the pipeline and the message
//! bus. Components receive their transport explicitly (usually as `Arc<T>`),
//! which lets tests substitute [`crate::testing::mocks::MockTransport`].

pub mod mqtt;

use mqtt::ConnectionState;
use tokio::sync::mpsc;

/// A message delivered on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

/// Transport abstraction for telemetry publishing and observation
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Connect and wait until the connection is acknowledged
    async fn connect(&mut self) -> Result<(), Self::Error>;

    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Publish raw bytes to `topic`
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error>;

    /// Subscribe to a topic filter; subscriptions survive reconnects
    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Register the listener for inbound messages
    async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>);

    /// Identifier the transport presents to the bus
    fn client_id(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Current connection state, `None` before `connect`
    fn connection_state(&self) -> Option<ConnectionState>;

    /// True once reconnection attempts have been exhausted
    fn is_permanently_disconnected(&self) -> bool;
}

/// Type alias for the MQTT transport
pub type MqttTransport = mqtt::MqttClient;
