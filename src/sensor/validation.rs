//! Pure validation of sensor setup input
//!
//! Whatever collects the setup values (CLI flags, a config file, a prompt loop)
//! calls [`validate`] and gets back either a ready [`SensorConfig`] or the first
//! problem found, in the order name, topic, format, unit.

use crate::config::{SensorSection, TopicsSection};
use crate::senml::PayloadFormat;
use thiserror::Error;

/// Unvalidated sensor setup values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorDraft {
    pub name: String,
    pub topic: String,
    pub unit: String,
    pub format: String,
}

impl SensorDraft {
    /// Start a draft from the `[sensor]` config section
    pub fn from_section(section: &SensorSection) -> Self {
        Self {
            name: section.name.clone().unwrap_or_default(),
            topic: section.topic.clone().unwrap_or_default(),
            unit: section.unit.clone().unwrap_or_default(),
            format: section.format.clone().unwrap_or_default(),
        }
    }

    /// Overlay any values that were supplied explicitly
    pub fn with_overrides(
        mut self,
        name: Option<String>,
        topic: Option<String>,
        unit: Option<String>,
        format: Option<String>,
    ) -> Self {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(topic) = topic {
            self.topic = topic;
        }
        if let Some(unit) = unit {
            self.unit = unit;
        }
        if let Some(format) = format {
            self.format = format;
        }
        self
    }
}

/// Validated, immutable sensor identity
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    name: String,
    topic: String,
    unit: String,
    format: PayloadFormat,
}

impl SensorConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }
}

/// Sensor setup validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Sensor name cannot be empty")]
    EmptyName,
    #[error("Unknown topic '{topic}'; choose one of {allowed:?}")]
    UnknownTopic { topic: String, allowed: Vec<String> },
    #[error("Unsupported payload format '{format}'; choose one of {allowed:?}")]
    UnsupportedFormat {
        format: String,
        allowed: Vec<&'static str>,
    },
    #[error("Sensor unit cannot be empty")]
    EmptyUnit,
}

/// Validate a draft against the configured topic set
pub fn validate(
    draft: &SensorDraft,
    topics: &TopicsSection,
) -> Result<SensorConfig, ValidationError> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let topic = draft.topic.trim();
    if !topics.is_publishable(topic) {
        return Err(ValidationError::UnknownTopic {
            topic: topic.to_string(),
            allowed: topics.publishable(),
        });
    }

    let format: PayloadFormat = draft.format.parse().map_err(|_| {
        ValidationError::UnsupportedFormat {
            format: draft.format.trim().to_string(),
            allowed: PayloadFormat::tags(),
        }
    })?;

    let unit = draft.unit.trim();
    if unit.is_empty() {
        return Err(ValidationError::EmptyUnit);
    }

    Ok(SensorConfig {
        name: name.to_string(),
        topic: topic.to_string(),
        unit: unit.to_string(),
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> TopicsSection {
        TopicsSection {
            persisted: vec![
                "Bedroom".to_string(),
                "LivingRoom".to_string(),
                "Garage".to_string(),
            ],
            unpersisted: vec!["Basement".to_string()],
        }
    }

    fn draft() -> SensorDraft {
        SensorDraft {
            name: "bedroom-temp".to_string(),
            topic: "Bedroom".to_string(),
            unit: "Cel".to_string(),
            format: "senml+json".to_string(),
        }
    }

    #[test]
    fn test_valid_draft() {
        let config = validate(&draft(), &topics()).unwrap();
        assert_eq!(config.name(), "bedroom-temp");
        assert_eq!(config.topic(), "Bedroom");
        assert_eq!(config.unit(), "Cel");
        assert_eq!(config.format(), PayloadFormat::Json);
    }

    #[test]
    fn test_values_are_trimmed() {
        let mut draft = draft();
        draft.name = "  bedroom-temp ".to_string();
        draft.unit = " Cel".to_string();
        let config = validate(&draft, &topics()).unwrap();
        assert_eq!(config.name(), "bedroom-temp");
        assert_eq!(config.unit(), "Cel");
    }

    #[test]
    fn test_unpersisted_topic_is_publishable() {
        let mut draft = draft();
        draft.topic = "Basement".to_string();
        assert!(validate(&draft, &topics()).is_ok());
    }

    #[test]
    fn test_empty_name() {
        let mut draft = draft();
        draft.name = "   ".to_string();
        assert_eq!(validate(&draft, &topics()), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_unknown_topic_lists_choices() {
        let mut draft = draft();
        draft.topic = "Attic".to_string();
        match validate(&draft, &topics()) {
            Err(ValidationError::UnknownTopic { topic, allowed }) => {
                assert_eq!(topic, "Attic");
                assert_eq!(allowed.len(), 4);
            }
            other => panic!("Expected UnknownTopic, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_format() {
        let mut draft = draft();
        draft.format = "senml+cbor".to_string();
        assert!(matches!(
            validate(&draft, &topics()),
            Err(ValidationError::UnsupportedFormat { ref format, .. }) if format == "senml+cbor"
        ));
    }

    #[test]
    fn test_empty_unit() {
        let mut draft = draft();
        draft.unit = String::new();
        assert_eq!(validate(&draft, &topics()), Err(ValidationError::EmptyUnit));
    }

    #[test]
    fn test_first_problem_wins() {
        let draft = SensorDraft::default();
        assert_eq!(validate(&draft, &topics()), Err(ValidationError::EmptyName));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let section = SensorSection {
            name: Some("from-file".to_string()),
            topic: Some("Garage".to_string()),
            unit: Some("Cel".to_string()),
            format: Some("senml+json".to_string()),
            ..Default::default()
        };
        let draft = SensorDraft::from_section(&section).with_overrides(
            Some("from-cli".to_string()),
            None,
            None,
            Some("senml+exi".to_string()),
        );
        assert_eq!(draft.name, "from-cli");
        assert_eq!(draft.topic, "Garage");
        assert_eq!(draft.format, "senml+exi");
    }
}
