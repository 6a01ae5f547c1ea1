//! Encoders and decoders for the three SenML wire formats
//!
//! - `senml+json`: single short-key record object (no pack array)
//! - `senml+xml`: `<sensml xmlns="urn:ietf:params:xml:ns:senml"><senml .../></sensml>`
//!   with the five fields as attributes of the child element
//! - `senml+exi`: raw DEFLATE of the canonical JSON record. It stands in for an
//!   EXI codec; only the content-type tag matters to the rest of the pipeline.

use super::format::PayloadFormat;
use super::reading::{Reading, ReadingError, SenmlRecord};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use thiserror::Error;

/// SenML XML namespace (RFC 8428 section 7)
pub const SENML_XML_NAMESPACE: &str = "urn:ietf:params:xml:ns:senml";

/// Encoding errors
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Unsupported format '{0}'")]
    UnsupportedFormat(String),
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XML serialization failed: {0}")]
    Xml(String),
    #[error("Compression failed: {0}")]
    Compression(#[source] std::io::Error),
}

/// Decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported content type '{0}'")]
    UnsupportedContentType(String),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid XML: {0}")]
    Xml(String),
    #[error("Unexpected XML namespace '{0}'")]
    NamespaceMismatch(String),
    #[error("Decompression failed: {0}")]
    Compression(#[source] std::io::Error),
    #[error("Invalid base64 body: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Envelope data for {content_type} must be {expected}")]
    UnexpectedBody {
        content_type: String,
        expected: &'static str,
    },
    #[error("Invalid reading: {0}")]
    InvalidReading(#[from] ReadingError),
}

/// Serialized body; the variant determines the content type
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedBody {
    Json(Value),
    Xml(String),
    Exi(Vec<u8>),
}

impl EncodedBody {
    pub fn format(&self) -> PayloadFormat {
        match self {
            EncodedBody::Json(_) => PayloadFormat::Json,
            EncodedBody::Xml(_) => PayloadFormat::Xml,
            EncodedBody::Exi(_) => PayloadFormat::Exi,
        }
    }
}

/// An encoded reading ready to be wrapped in an envelope
///
/// The content type is derived from the body, so the pair can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedMessage {
    body: EncodedBody,
}

impl EncodedMessage {
    pub fn from_body(body: EncodedBody) -> Self {
        Self { body }
    }

    pub fn format(&self) -> PayloadFormat {
        self.body.format()
    }

    /// `application/<format-tag>`
    pub fn content_type(&self) -> String {
        self.format().content_type()
    }

    pub fn body(&self) -> &EncodedBody {
        &self.body
    }

    pub fn into_body(self) -> EncodedBody {
        self.body
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "sensml")]
struct XmlPack {
    #[serde(rename = "@xmlns", default, skip_serializing_if = "Option::is_none")]
    xmlns: Option<String>,
    senml: XmlRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlRecord {
    #[serde(rename = "@bn")]
    bn: String,
    #[serde(rename = "@u")]
    u: String,
    #[serde(rename = "@n")]
    n: String,
    #[serde(rename = "@v")]
    v: f64,
    #[serde(rename = "@t")]
    t: i64,
}

/// Encode a reading in the requested format
pub fn encode(reading: &Reading, format: PayloadFormat) -> Result<EncodedMessage, EncodeError> {
    let body = match format {
        PayloadFormat::Json => EncodedBody::Json(encode_json(reading)?),
        PayloadFormat::Xml => EncodedBody::Xml(encode_xml(reading)?),
        PayloadFormat::Exi => EncodedBody::Exi(encode_exi(reading)?),
    };
    Ok(EncodedMessage::from_body(body))
}

/// Encode using a format tag such as `senml+xml`
///
/// Fails with [`EncodeError::UnsupportedFormat`] before any encoding work when
/// the tag is not recognized.
pub fn encode_tagged(reading: &Reading, tag: &str) -> Result<EncodedMessage, EncodeError> {
    let format: PayloadFormat = tag.parse()?;
    encode(reading, format)
}

/// Decode an encoded message back into a reading
pub fn decode(message: &EncodedMessage) -> Result<Reading, DecodeError> {
    let record = match message.body() {
        EncodedBody::Json(value) => decode_json(value)?,
        EncodedBody::Xml(document) => decode_xml(document)?,
        EncodedBody::Exi(bytes) => decode_exi(bytes)?,
    };
    Ok(Reading::try_from(record)?)
}

fn encode_json(reading: &Reading) -> Result<Value, EncodeError> {
    Ok(serde_json::to_value(SenmlRecord::from(reading))?)
}

fn encode_xml(reading: &Reading) -> Result<String, EncodeError> {
    let pack = XmlPack {
        xmlns: Some(SENML_XML_NAMESPACE.to_string()),
        senml: XmlRecord {
            bn: reading.base_name().to_string(),
            u: reading.unit().to_string(),
            n: reading.name().to_string(),
            v: reading.value(),
            t: reading.timestamp(),
        },
    };
    quick_xml::se::to_string(&pack).map_err(|e| EncodeError::Xml(e.to_string()))
}

fn encode_exi(reading: &Reading) -> Result<Vec<u8>, EncodeError> {
    let canonical = serde_json::to_vec(&SenmlRecord::from(reading))?;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&canonical)
        .map_err(EncodeError::Compression)?;
    encoder.finish().map_err(EncodeError::Compression)
}

fn decode_json(value: &Value) -> Result<SenmlRecord, DecodeError> {
    Ok(SenmlRecord::deserialize(value)?)
}

fn decode_xml(document: &str) -> Result<SenmlRecord, DecodeError> {
    let pack: XmlPack =
        quick_xml::de::from_str(document).map_err(|e| DecodeError::Xml(e.to_string()))?;

    if let Some(namespace) = pack.xmlns {
        if namespace != SENML_XML_NAMESPACE {
            return Err(DecodeError::NamespaceMismatch(namespace));
        }
    }

    let XmlRecord { bn, u, n, v, t } = pack.senml;
    Ok(SenmlRecord { bn, u, n, v, t })
}

fn decode_exi(bytes: &[u8]) -> Result<SenmlRecord, DecodeError> {
    let mut canonical = Vec::new();
    DeflateDecoder::new(bytes)
        .read_to_end(&mut canonical)
        .map_err(DecodeError::Compression)?;
    Ok(serde_json::from_slice(&canonical)?)
}
