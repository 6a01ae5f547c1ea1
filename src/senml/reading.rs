//! Reading model and its short-key SenML record form

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single sensor measurement
///
/// Fields are fixed at construction; `name` and `unit` are guaranteed non-empty.
///
/// # Examples
/// ```
/// use senml_pipeline::senml::Reading;
///
/// let reading = Reading::new("sensor-01", "Cel", "garage-temp", 12.25, 1_700_000_000_000)?;
/// assert_eq!(reading.unit(), "Cel");
/// assert!(Reading::new("sensor-01", "", "garage-temp", 1.0, 0).is_err());
/// # Ok::<(), senml_pipeline::senml::ReadingError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    base_name: String,
    unit: String,
    name: String,
    value: f64,
    timestamp: i64,
}

/// Reading construction errors
#[derive(Debug, Error, PartialEq)]
pub enum ReadingError {
    #[error("Reading name cannot be empty")]
    EmptyName,
    #[error("Reading unit cannot be empty")]
    EmptyUnit,
}

impl Reading {
    pub fn new(
        base_name: impl Into<String>,
        unit: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        timestamp: i64,
    ) -> Result<Self, ReadingError> {
        let unit = unit.into();
        let name = name.into();

        if name.trim().is_empty() {
            return Err(ReadingError::EmptyName);
        }
        if unit.trim().is_empty() {
            return Err(ReadingError::EmptyUnit);
        }

        Ok(Self {
            base_name: base_name.into(),
            unit,
            name,
            value,
            timestamp,
        })
    }

    /// Build a reading whose name and unit were already validated by sensor setup
    pub(crate) fn from_validated(
        base_name: &str,
        unit: &str,
        name: &str,
        value: f64,
        timestamp: i64,
    ) -> Self {
        debug_assert!(!name.trim().is_empty() && !unit.trim().is_empty());
        Self {
            base_name: base_name.to_string(),
            unit: unit.to_string(),
            name: name.to_string(),
            value,
            timestamp,
        }
    }

    /// Identifier of the publishing client/session
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Short-key SenML record: `{"bn", "u", "n", "v", "t"}`
///
/// This is the wire shape for `senml+json` and the canonical form that the
/// EXI-profile body is derived from. It is not validated; convert it into a
/// [`Reading`] with `TryFrom` to enforce the reading invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenmlRecord {
    pub bn: String,
    pub u: String,
    pub n: String,
    pub v: f64,
    pub t: i64,
}

impl From<&Reading> for SenmlRecord {
    fn from(reading: &Reading) -> Self {
        Self {
            bn: reading.base_name.clone(),
            u: reading.unit.clone(),
            n: reading.name.clone(),
            v: reading.value,
            t: reading.timestamp,
        }
    }
}

impl TryFrom<SenmlRecord> for Reading {
    type Error = ReadingError;

    fn try_from(record: SenmlRecord) -> Result<Self, Self::Error> {
        Reading::new(record.bn, record.u, record.n, record.v, record.t)
    }
}
