//! Pipeline configuration
//!
//! Loaded from TOML. Addresses and secrets are never stored in the file itself:
//! the file names the environment variables that hold them.

use crate::broker::OverflowPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level configuration shared by the sensor, broker and monitor roles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub mqtt: MqttSection,
    pub topics: TopicsSection,
    #[serde(default)]
    pub sensor: SensorSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub storage: StorageSection,
}

/// MQTT transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with scheme and port, e.g. `mqtt://localhost:8080`
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// QoS level for telemetry publishes and subscriptions (0, 1 or 2)
    #[serde(default)]
    pub qos: u8,
}

fn default_keep_alive() -> u64 {
    60
}

/// The closed topic set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    /// Topics the broker persists (the allow-list)
    pub persisted: Vec<String>,
    /// Topics sensors may publish to that are observed but never stored
    #[serde(default)]
    pub unpersisted: Vec<String>,
}

impl TopicsSection {
    pub fn is_persisted(&self, topic: &str) -> bool {
        self.persisted.iter().any(|t| t == topic)
    }

    /// Whether a sensor may publish to `topic`
    pub fn is_publishable(&self, topic: &str) -> bool {
        self.is_persisted(topic) || self.unpersisted.iter().any(|t| t == topic)
    }

    /// Every topic a sensor may publish to, persisted ones first
    pub fn publishable(&self) -> Vec<String> {
        self.persisted
            .iter()
            .chain(self.unpersisted.iter())
            .cloned()
            .collect()
    }
}

/// Sensor defaults; CLI flags take precedence over these
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorSection {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub unit: Option<String>,
    pub format: Option<String>,
    /// Publish period in milliseconds
    #[serde(default = "default_publish_interval")]
    pub publish_interval_ms: u64,
    /// Lower bound of generated values (inclusive)
    #[serde(default = "default_value_min")]
    pub value_min: f64,
    /// Width of the generated value range; values fall in `[min, min + span)`
    #[serde(default = "default_value_span")]
    pub value_span: f64,
    /// Round generated values down to whole numbers
    #[serde(default)]
    pub whole_values: bool,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            name: None,
            topic: None,
            unit: None,
            format: None,
            publish_interval_ms: default_publish_interval(),
            value_min: default_value_min(),
            value_span: default_value_span(),
            whole_values: false,
        }
    }
}

fn default_publish_interval() -> u64 {
    7500
}

fn default_value_min() -> f64 {
    -5.0
}

fn default_value_span() -> f64 {
    35.0
}

/// Broker ingest settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Maximum records waiting for a persistence slot
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum concurrent inserts
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// What to do when the queue is full
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Subscription filter used to observe every published packet
    #[serde(default = "default_subscription")]
    pub subscription: String,
    /// Capacity of the channel between the MQTT event loop and the router
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
            overflow: OverflowPolicy::default(),
            subscription: default_subscription(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_in_flight() -> usize {
    16
}

fn default_subscription() -> String {
    "#".to_string()
}

fn default_inbound_buffer() -> usize {
    256
}

/// Persistence sink settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    /// Environment variable holding the store connection string
    #[serde(default = "default_database_url_env")]
    pub database_url_env: String,
    /// Collection records are inserted into
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_url_env: default_database_url_env(),
            collection: default_collection(),
        }
    }
}

fn default_database_url_env() -> String {
    "DB_URL".to_string()
}

fn default_collection() -> String {
    "logs".to_string()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topics.persisted.is_empty() {
            return invalid("[topics] persisted must list at least one topic");
        }
        if let Some(topic) = self
            .topics
            .publishable()
            .iter()
            .find(|t| t.trim().is_empty() || t.contains(['#', '+']))
        {
            return invalid(format!(
                "topic '{topic}' must be non-empty and free of MQTT wildcards"
            ));
        }
        if let Some(topic) = self
            .topics
            .unpersisted
            .iter()
            .find(|t| self.topics.is_persisted(t))
        {
            return invalid(format!(
                "topic '{topic}' cannot be both persisted and unpersisted"
            ));
        }
        if self.mqtt.qos > 2 {
            return invalid(format!("mqtt.qos must be 0, 1 or 2, got {}", self.mqtt.qos));
        }
        if self.sensor.publish_interval_ms == 0 {
            return invalid("sensor.publish_interval_ms must be greater than 0");
        }
        if !self.sensor.value_min.is_finite()
            || !self.sensor.value_span.is_finite()
            || self.sensor.value_span <= 0.0
        {
            return invalid("sensor.value_min must be finite and sensor.value_span positive");
        }
        if self.broker.queue_capacity == 0 || self.broker.max_in_flight == 0 {
            return invalid("broker.queue_capacity and broker.max_in_flight must be greater than 0");
        }
        if self.broker.inbound_buffer == 0 {
            return invalid("broker.inbound_buffer must be greater than 0");
        }
        if self.storage.collection.trim().is_empty() {
            return invalid("storage.collection cannot be empty");
        }
        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT username from environment variable
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.username_env.as_ref())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.mqtt.password_env.as_ref())
    }

    /// Get the persistence connection string from its environment variable
    pub fn get_database_url(&self) -> Result<String, ConfigError> {
        std::env::var(&self.storage.database_url_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.storage.database_url_env.clone()))
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[mqtt]
broker_url = "mqtt://localhost:1883"

[topics]
persisted = ["Bedroom", "LivingRoom", "Garage"]
unpersisted = ["Basement"]
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn invalid<T>(message: impl Into<String>) -> Result<T, ConfigError> {
    Err(ConfigError::InvalidConfig(message.into()))
}
