//! Connection state, reconnection settings and client options
//!
//! Everything here is pure: no sockets are opened and no tasks are spawned.

use crate::config::MqttSection;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Largest packet accepted in either direction
const MAX_PACKET_SIZE: u32 = 64 * 1024;

/// Connection state for the MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Initial state, waiting for the broker's ConnAck
    Connecting,
    /// Connected and ready to publish/subscribe
    Connected,
    /// Connection lost, with reason
    Disconnected(String),
    /// Reconnection attempt in progress
    Reconnecting(u32),
    /// Reconnection attempts exhausted
    PermanentlyDisconnected(String),
}

/// Reconnection backoff settings
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum reconnection attempts; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Delays in milliseconds for the first attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay in milliseconds once the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: vec![250, 500, 1000, 2000, 5000],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before the given (1-based) attempt
    pub fn backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    /// Sum of every delay when attempts are bounded
    pub fn max_total_delay(&self) -> Option<u64> {
        self.max_attempts
            .map(|max| (1..=max).map(|attempt| self.backoff_delay(attempt)).sum())
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publishing to '{topic}' failed")]
    PublishFailed {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Subscribing to '{topic}' failed")]
    SubscriptionFailed {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid QoS level {0}; expected 0, 1 or 2")]
    InvalidQos(u8),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Map a numeric QoS level to the protocol enum
pub fn qos_from_level(level: u8) -> Result<QoS, MqttError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MqttError::InvalidQos(other)),
    }
}

/// Broker address extracted from a `mqtt://` or `mqtts://` URL
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    pub fn parse(broker_url: &str) -> Result<Self, MqttError> {
        let invalid = || MqttError::InvalidBrokerUrl(broker_url.to_string());
        let url = Url::parse(broker_url).map_err(|_| invalid())?;

        let tls = match url.scheme() {
            "mqtt" | "tcp" => false,
            "mqtts" | "ssl" => true,
            _ => return Err(invalid()),
        };
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
        let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

/// Client id used as the SenML base name; stable for the life of the client
pub fn generate_client_id(prefix: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let prefix = prefix.trim();
    if prefix.is_empty() {
        format!("senml-{}", &suffix[..12])
    } else {
        format!("{prefix}-{}", &suffix[..12])
    }
}

/// Build rumqttc options for one connection attempt
pub fn configure_mqtt_options(
    client_id: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let address = BrokerAddress::parse(&config.broker_url)?;
    let mut options = MqttOptions::new(client_id, address.host, address.port);

    if address.tls {
        options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config
        .username_env
        .as_ref()
        .and_then(|name| std::env::var(name).ok())
    {
        let password = config
            .password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default();
        options.set_credentials(username, password);
    }

    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_start(true);
    options.set_max_packet_size(Some(MAX_PACKET_SIZE));

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mqtt_config(url: &str) -> MqttSection {
        MqttSection {
            broker_url: url.to_string(),
            username_env: None,
            password_env: None,
            keep_alive_secs: 60,
            qos: 0,
        }
    }

    #[test]
    fn test_backoff_pattern_then_sustained() {
        let config = ReconnectConfig::default();
        assert_eq!(config.backoff_delay(1), 250);
        assert_eq!(config.backoff_delay(3), 1000);
        assert_eq!(config.backoff_delay(5), 5000);
        assert_eq!(config.backoff_delay(50), 5000);
    }

    #[test]
    fn test_empty_pattern_uses_sustained_delay() {
        let config = ReconnectConfig {
            max_attempts: Some(3),
            backoff_pattern: Vec::new(),
            sustained_delay: 100,
        };
        assert_eq!(config.backoff_delay(1), 100);
        assert_eq!(config.max_total_delay(), Some(300));
    }

    #[test]
    fn test_unbounded_total_delay() {
        assert_eq!(ReconnectConfig::default().max_total_delay(), None);
    }

    #[test]
    fn test_qos_levels() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(qos_from_level(3), Err(MqttError::InvalidQos(3))));
    }

    #[test]
    fn test_broker_address_defaults() {
        assert_eq!(
            BrokerAddress::parse("mqtt://localhost").unwrap(),
            BrokerAddress {
                host: "localhost".to_string(),
                port: 1883,
                tls: false
            }
        );
        let secure = BrokerAddress::parse("mqtts://broker.example.com").unwrap();
        assert_eq!(secure.port, 8883);
        assert!(secure.tls);
        assert_eq!(BrokerAddress::parse("mqtt://127.0.0.1:8080").unwrap().port, 8080);
    }

    #[test]
    fn test_broker_address_rejects_bad_urls() {
        for url in ["invalid-url", "http://localhost:1883", "mqtt://"] {
            assert!(
                matches!(BrokerAddress::parse(url), Err(MqttError::InvalidBrokerUrl(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn test_client_id_is_prefixed_and_unique() {
        let first = generate_client_id("sensor");
        let second = generate_client_id("sensor");
        assert!(first.starts_with("sensor-"));
        assert_ne!(first, second);
        assert!(generate_client_id("  ").starts_with("senml-"));
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options("sensor-1", &mqtt_config("mqtt://localhost:1883"));
        let options = options.unwrap();
        assert_eq!(options.client_id(), "sensor-1");
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_configure_mqtt_options_invalid_url() {
        let result = configure_mqtt_options("sensor-1", &mqtt_config("not a url"));
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }
}
