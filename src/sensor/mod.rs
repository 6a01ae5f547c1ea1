//! Sensor setup and simulation
//!
//! [`validate`] turns a raw setup draft into an immutable [`SensorConfig`];
//! [`SensorSimulator`] owns that configuration and publishes one encoded
//! reading per period.

pub mod simulator;
pub mod validation;

pub use simulator::{SensorSimulator, ValueRange};
pub use validation::{validate, SensorConfig, SensorDraft, ValidationError};
