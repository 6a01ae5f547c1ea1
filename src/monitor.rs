//! Telemetry monitor
//!
//! Subscriber-side view of the bus: each inbound message is unwrapped from its
//! envelope, decoded back into a [`Reading`] and logged. Messages that cannot
//! be decoded are logged and skipped.

use crate::error::PipelineResult;
use crate::senml::{decode, Envelope, PayloadFormat, Reading};
use crate::transport::InboundMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn, Instrument};

/// A successfully decoded telemetry message
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTelemetry {
    pub topic: String,
    pub format: PayloadFormat,
    pub reading: Reading,
}

/// Decode one inbound message: envelope, then body
pub fn decode_inbound(message: &InboundMessage) -> PipelineResult<DecodedTelemetry> {
    let encoded = Envelope::from_slice(&message.payload)?.into_message()?;
    let reading = decode(&encoded)?;

    Ok(DecodedTelemetry {
        topic: message.topic.clone(),
        format: encoded.format(),
        reading,
    })
}

#[derive(Debug, Default)]
pub struct TelemetryMonitor {
    decoded: AtomicU64,
    skipped: AtomicU64,
}

impl TelemetryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decoded_count(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Decode and log one message
    pub fn observe(&self, message: &InboundMessage) -> Option<DecodedTelemetry> {
        match decode_inbound(message) {
            Ok(telemetry) => {
                self.decoded.fetch_add(1, Ordering::Relaxed);
                let reading = &telemetry.reading;
                info!(
                    topic = %telemetry.topic,
                    format = %telemetry.format,
                    base_name = %reading.base_name(),
                    name = %reading.name(),
                    unit = %reading.unit(),
                    value = reading.value(),
                    timestamp = reading.timestamp(),
                    "Telemetry received"
                );
                Some(telemetry)
            }
            Err(e) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    component = e.component(),
                    topic = %message.topic,
                    bytes = message.payload.len(),
                    error = %e,
                    "Skipping undecodable message"
                );
                None
            }
        }
    }

    /// Observe inbound messages until the channel closes or `shutdown` flips
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let span = tracing::info_span!("monitor", component = "monitor");

        async {
            info!("Telemetry monitor started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    message = inbound.recv() => {
                        match message {
                            Some(message) => {
                                self.observe(&message);
                            }
                            None => break,
                        }
                    }
                }
            }
            info!(
                decoded = self.decoded_count(),
                skipped = self.skipped_count(),
                "Telemetry monitor stopped"
            );
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::senml::encode;

    fn wire(reading: &Reading, format: PayloadFormat) -> Vec<u8> {
        let message = encode(reading, format).unwrap();
        Envelope::wrap(&message).to_bytes().unwrap()
    }

    fn reading() -> Reading {
        Reading::new("sensor-abc", "Cel", "garage-temp", 18.25, 1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_decode_inbound_every_format() {
        for format in [PayloadFormat::Json, PayloadFormat::Xml, PayloadFormat::Exi] {
            let message = InboundMessage::new("Garage", wire(&reading(), format));
            let telemetry = decode_inbound(&message).unwrap();
            assert_eq!(telemetry.topic, "Garage");
            assert_eq!(telemetry.format, format);
            assert_eq!(telemetry.reading, reading());
        }
    }

    #[test]
    fn test_decode_inbound_rejects_garbage() {
        let message = InboundMessage::new("Garage", b"not-json".to_vec());
        assert!(matches!(
            decode_inbound(&message),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn test_observe_counts() {
        let monitor = TelemetryMonitor::new();
        assert!(monitor
            .observe(&InboundMessage::new("Bedroom", wire(&reading(), PayloadFormat::Json)))
            .is_some());
        assert!(monitor
            .observe(&InboundMessage::new("Bedroom", b"{}".to_vec()))
            .is_none());

        assert_eq!(monitor.decoded_count(), 1);
        assert_eq!(monitor.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_channel_closes() {
        let monitor = TelemetryMonitor::new();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(InboundMessage::new("Garage", wire(&reading(), PayloadFormat::Exi)))
            .await
            .unwrap();
        tx.send(InboundMessage::new("Garage", b"junk".to_vec()))
            .await
            .unwrap();
        drop(tx);

        monitor.run(rx, shutdown_rx).await;
        assert_eq!(monitor.decoded_count(), 1);
        assert_eq!(monitor.skipped_count(), 1);
    }
}
