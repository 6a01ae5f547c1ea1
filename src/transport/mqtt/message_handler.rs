//! MQTT event routing and inbound forwarding
//!
//! [`MessageHandler::route_mqtt_event`] classifies raw rumqttc events; the
//! [`MessageForwarder`] hands received publishes to the registered listener
//! without ever blocking the event loop.

use crate::transport::InboundMessage;
use rumqttc::v5::mqttbytes::v5::{Packet, SubscribeReasonCode};
use rumqttc::v5::Event;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Routing decision for one event-loop event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    ConnectionAcknowledged,
    MessageReceived { topic: String, payload: Vec<u8> },
    Disconnected,
    SubscriptionConfirmed { packet_id: u16, failed: bool },
    InfrastructureEvent(String),
    OutgoingEvent,
}

pub struct MessageHandler;

impl MessageHandler {
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => EventRoute::ConnectionAcknowledged,
            Event::Incoming(Packet::Publish(publish)) => EventRoute::MessageReceived {
                topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                payload: publish.payload.to_vec(),
            },
            Event::Incoming(Packet::Disconnect(_)) => EventRoute::Disconnected,
            Event::Incoming(Packet::SubAck(suback)) => EventRoute::SubscriptionConfirmed {
                packet_id: suback.pkid,
                failed: suback
                    .return_codes
                    .iter()
                    .any(|code| !matches!(code, SubscribeReasonCode::Success(_))),
            },
            Event::Incoming(other) => EventRoute::InfrastructureEvent(format!("{other:?}")),
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Delivery outcome for one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    NoListener,
    ListenerBusy,
    ListenerClosed,
}

/// Hands inbound publishes to the registered listener
#[derive(Debug, Default)]
pub struct MessageForwarder {
    sender: Option<mpsc::Sender<InboundMessage>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sender(&mut self, sender: mpsc::Sender<InboundMessage>) {
        self.sender = Some(sender);
    }

    /// Forward without waiting; a full channel drops the message
    pub fn forward(&self, message: InboundMessage) -> ForwardOutcome {
        let Some(sender) = &self.sender else {
            debug!(topic = %message.topic, "No listener registered; message dropped");
            return ForwardOutcome::NoListener;
        };

        match sender.try_send(message) {
            Ok(()) => ForwardOutcome::Delivered,
            Err(TrySendError::Full(message)) => {
                warn!(
                    component = "transport",
                    topic = %message.topic,
                    "Inbound listener is behind; message dropped"
                );
                ForwardOutcome::ListenerBusy
            }
            Err(TrySendError::Closed(message)) => {
                debug!(topic = %message.topic, "Inbound listener closed; message dropped");
                ForwardOutcome::ListenerClosed
            }
        }
    }
}
