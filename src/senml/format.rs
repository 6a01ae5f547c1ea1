//! Payload format selection

use super::codec::EncodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire format of an encoded reading
///
/// Closed set: adding a variant forces every `match` over it to be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadFormat {
    #[serde(rename = "senml+json")]
    Json,
    #[serde(rename = "senml+xml")]
    Xml,
    #[serde(rename = "senml+exi")]
    Exi,
}

impl PayloadFormat {
    pub const ALL: [PayloadFormat; 3] = [
        PayloadFormat::Json,
        PayloadFormat::Xml,
        PayloadFormat::Exi,
    ];

    /// Format tag, e.g. `senml+json`
    pub fn tag(&self) -> &'static str {
        match self {
            PayloadFormat::Json => "senml+json",
            PayloadFormat::Xml => "senml+xml",
            PayloadFormat::Exi => "senml+exi",
        }
    }

    /// Content type carried in the envelope, e.g. `application/senml+json`
    pub fn content_type(&self) -> String {
        format!("application/{}", self.tag())
    }

    /// Resolve a full `application/<tag>` content type
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        content_type
            .strip_prefix("application/")
            .and_then(|tag| tag.parse().ok())
    }

    /// All recognized tags, for error messages and CLI help
    pub fn tags() -> Vec<&'static str> {
        Self::ALL.iter().map(PayloadFormat::tag).collect()
    }
}

impl FromStr for PayloadFormat {
    type Err = EncodeError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim() {
            "senml+json" => Ok(PayloadFormat::Json),
            "senml+xml" => Ok(PayloadFormat::Xml),
            "senml+exi" => Ok(PayloadFormat::Exi),
            other => Err(EncodeError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
