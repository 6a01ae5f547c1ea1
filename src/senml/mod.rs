//! SenML telemetry encoding
//!
//! This module implements the reading model and its three wire representations,
//! plus the JSON envelope every encoded body travels in.

pub mod codec;
pub mod envelope;
pub mod format;
pub mod reading;

pub use codec::{
    decode, encode, encode_tagged, DecodeError, EncodeError, EncodedBody, EncodedMessage,
    SENML_XML_NAMESPACE,
};
pub use envelope::Envelope;
pub use format::PayloadFormat;
pub use reading::{Reading, ReadingError, SenmlRecord};
