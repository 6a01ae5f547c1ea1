//! SenML Telemetry Pipeline
//!
//! Simulated sensors encode periodic readings as SenML (JSON, XML or an EXI-profile
//! binary body), publish them over MQTT, and a broker-side router persists the
//! allow-listed topics into a document store.
//!
//! # Overview
//!
//! - [`senml`] - Reading model, format dispatch, encoders/decoders and the wire envelope
//! - [`sensor`] - Setup validation and the periodic sensor simulator
//! - [`broker`] - Topic allow-list routing, bounded ingest queue and persistence worker
//! - [`storage`] - Document sink abstraction with in-memory and SQLite backends
//! - [`transport`] - Transport trait and the rumqttc-based MQTT client
//! - [`monitor`] - Subscriber path that decodes and logs inbound telemetry
//!
//! # Quick Start
//!
//! ```rust
//! use senml_pipeline::senml::{decode, encode, Envelope, PayloadFormat, Reading};
//!
//! let reading = Reading::new("sensor-1a2b", "Cel", "bedroom-temp", 21.5, 1_700_000_000_000)?;
//! let message = encode(&reading, PayloadFormat::Xml)?;
//! assert_eq!(message.content_type(), "application/senml+xml");
//!
//! // Every body travels inside a JSON envelope
//! let wire = Envelope::wrap(&message).to_bytes()?;
//! let received = Envelope::from_slice(&wire)?.into_message()?;
//! assert_eq!(decode(&received)?, reading);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod monitor;
pub mod observability;
pub mod senml;
pub mod sensor;
pub mod storage;
pub mod testing;
pub mod transport;

pub use broker::{
    BrokerRouter, IngestOutcome, IngestSnapshot, OverflowPolicy, PersistenceRecord, RouterOptions,
};
pub use config::*;
pub use error::{PipelineError, PipelineResult};
pub use monitor::{decode_inbound, DecodedTelemetry, TelemetryMonitor};
pub use senml::{EncodedMessage, Envelope, PayloadFormat, Reading};
pub use sensor::{validate, SensorConfig, SensorDraft, SensorSimulator, ValueRange};
pub use storage::{DocumentStore, StoreBackend};
pub use transport::mqtt::MqttClient;
pub use transport::{InboundMessage, Transport};
