//! Wire envelope: `{"contentType": "application/<format>", "data": <body>}`
//!
//! The envelope is always JSON regardless of the inner format. XML bodies are
//! carried as a JSON string and EXI bodies as a base64 JSON string.

use super::codec::{DecodeError, EncodedBody, EncodedMessage};
use super::format::PayloadFormat;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub content_type: String,
    pub data: Value,
}

impl Envelope {
    /// Wrap an encoded message for transport
    pub fn wrap(message: &EncodedMessage) -> Self {
        let data = match message.body() {
            EncodedBody::Json(value) => value.clone(),
            EncodedBody::Xml(document) => Value::String(document.clone()),
            EncodedBody::Exi(bytes) => Value::String(BASE64.encode(bytes)),
        };
        Self {
            content_type: message.content_type(),
            data,
        }
    }

    /// JSON-stringified envelope bytes, as published on the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Rebuild the encoded message, checking that `data` matches the content type
    pub fn into_message(self) -> Result<EncodedMessage, DecodeError> {
        let format = PayloadFormat::from_content_type(&self.content_type)
            .ok_or_else(|| DecodeError::UnsupportedContentType(self.content_type.clone()))?;

        let body = match (format, self.data) {
            (PayloadFormat::Json, data @ Value::Object(_)) => EncodedBody::Json(data),
            (PayloadFormat::Xml, Value::String(document)) => EncodedBody::Xml(document),
            (PayloadFormat::Exi, Value::String(encoded)) => {
                EncodedBody::Exi(BASE64.decode(encoded.as_bytes())?)
            }
            (format, _) => {
                return Err(DecodeError::UnexpectedBody {
                    content_type: self.content_type,
                    expected: match format {
                        PayloadFormat::Json => "a JSON object",
                        PayloadFormat::Xml => "an XML string",
                        PayloadFormat::Exi => "a base64 string",
                    },
                })
            }
        };

        Ok(EncodedMessage::from_body(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::senml::{decode, encode, Reading};
    use proptest::prelude::*;

    fn reading() -> Reading {
        Reading::new("sensor-abc", "%RH", "garage-humidity", 48.5, 1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_json_envelope_shape() {
        let message = encode(&reading(), PayloadFormat::Json).unwrap();
        let wire = Envelope::wrap(&message).to_bytes().unwrap();
        let value: Value = serde_json::from_slice(&wire).unwrap();

        assert_eq!(value["contentType"], "application/senml+json");
        assert_eq!(value["data"]["n"], "garage-humidity");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_xml_and_exi_bodies_nest_as_strings() {
        for format in [PayloadFormat::Xml, PayloadFormat::Exi] {
            let message = encode(&reading(), format).unwrap();
            let envelope = Envelope::wrap(&message);
            assert!(envelope.data.is_string(), "{format} body should be a JSON string");
            assert_eq!(envelope.content_type, format.content_type());
        }
    }

    #[test]
    fn test_wire_round_trip_all_formats() {
        for format in PayloadFormat::ALL {
            let message = encode(&reading(), format).unwrap();
            let wire = Envelope::wrap(&message).to_bytes().unwrap();
            let received = Envelope::from_slice(&wire).unwrap().into_message().unwrap();
            assert_eq!(received, message);
            assert_eq!(decode(&received).unwrap(), reading());
        }
    }

    #[test]
    fn test_unknown_content_type() {
        let envelope = Envelope {
            content_type: "application/cbor".to_string(),
            data: Value::Null,
        };
        assert!(matches!(
            envelope.into_message(),
            Err(DecodeError::UnsupportedContentType(_))
        ));
    }

    #[test]
    fn test_body_must_match_content_type() {
        let envelope = Envelope {
            content_type: "application/senml+xml".to_string(),
            data: serde_json::json!({"n": "x"}),
        };
        assert!(matches!(
            envelope.into_message(),
            Err(DecodeError::UnexpectedBody { .. })
        ));
    }

    #[test]
    fn test_invalid_base64_exi_body() {
        let envelope = Envelope {
            content_type: "application/senml+exi".to_string(),
            data: Value::String("!!not base64!!".to_string()),
        };
        assert!(matches!(envelope.into_message(), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_from_slice_rejects_non_json() {
        assert!(matches!(
            Envelope::from_slice(b"not-json"),
            Err(DecodeError::Json(_))
        ));
    }

    fn through_the_wire(reading: &Reading, format: PayloadFormat) -> Reading {
        let wire = Envelope::wrap(&encode(reading, format).unwrap())
            .to_bytes()
            .unwrap();
        let message = Envelope::from_slice(&wire)
            .unwrap()
            .into_message()
            .unwrap();
        decode(&message).unwrap()
    }

    #[test]
    fn test_wire_keeps_values_that_need_seventeen_digits() {
        let reading = Reading::new("", "/", "A", 917198.3205261423, 0).unwrap();
        for format in PayloadFormat::ALL {
            assert_eq!(through_the_wire(&reading, format), reading, "{format}");
        }
    }

    proptest! {
        #[test]
        fn wire_round_trip_keeps_every_finite_value(
            value in prop::num::f64::POSITIVE
                | prop::num::f64::NEGATIVE
                | prop::num::f64::NORMAL
                | prop::num::f64::SUBNORMAL
                | prop::num::f64::ZERO,
            timestamp in 0i64..4_102_444_800_000,
        ) {
            let reading = Reading::new("sensor-0a1b2c", "Cel", "temp", value, timestamp).unwrap();
            for format in PayloadFormat::ALL {
                prop_assert_eq!(through_the_wire(&reading, format), reading.clone());
            }
        }
    }
}
