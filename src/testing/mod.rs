//! Testing utilities and mock implementations
//!
//! Lets the sensor, broker and monitor paths run without an MQTT broker or a
//! database.

pub mod mocks;

pub use mocks::*;
