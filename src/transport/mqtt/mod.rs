//! MQTT v5 transport built on rumqttc
//!
//! Pure logic is kept apart from I/O so most of it can be tested without a broker:
//!
//! - [`connection`] - Connection state, reconnect settings and client options
//! - [`message_handler`] - Event routing and inbound forwarding
//! - [`health_monitor`] - Reconnection decisions and state transitions
//! - [`client`] - The [`MqttClient`] and its supervisor task
//!
//! # Usage
//!
//! ```rust,no_run
//! use senml_pipeline::config::MqttSection;
//! use senml_pipeline::transport::mqtt::MqttClient;
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://localhost:1883".to_string(),
//!     username_env: None,
//!     password_env: None,
//!     keep_alive_secs: 60,
//!     qos: 0,
//! };
//!
//! let mut client = MqttClient::new("sensor", config)?;
//! client.connect().await?;
//! client.publish("Garage", b"{}".to_vec()).await?;
//! client.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{
    configure_mqtt_options, generate_client_id, qos_from_level, BrokerAddress, ConnectionState,
    MqttError, ReconnectConfig,
};
pub use health_monitor::{ConnectionEvent, HealthMonitor, ReconnectionDecision};
pub use message_handler::{EventRoute, ForwardOutcome, MessageForwarder, MessageHandler};
