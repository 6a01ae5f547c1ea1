//! Periodic sensor simulator
//!
//! Each cycle produces one reading, encodes it in the sensor's format, wraps it
//! in the JSON envelope and publishes it on the sensor's topic. Delivery is
//! best-effort: a cycle that finds the transport disconnected drops its reading
//! instead of buffering it.

use super::validation::SensorConfig;
use crate::config::{ConfigError, SensorSection};
use crate::error::{PipelineError, PipelineResult};
use crate::senml::{encode, EncodeError, Envelope, Reading};
use crate::transport::Transport;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn, Instrument};

/// Range generated values are drawn from: `[min, min + span)`
///
/// Values are produced as `min + uniform(0, 1) * span`, optionally floored
/// to whole numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    min: f64,
    span: f64,
    whole: bool,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self {
            min: -5.0,
            span: 35.0,
            whole: false,
        }
    }
}

impl ValueRange {
    pub fn new(min: f64, span: f64) -> Result<Self, ConfigError> {
        if !min.is_finite() || !span.is_finite() || span <= 0.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "invalid value range: min={min}, span={span}"
            )));
        }
        Ok(Self {
            min,
            span,
            whole: false,
        })
    }

    pub fn from_section(section: &SensorSection) -> Result<Self, ConfigError> {
        let range = Self::new(section.value_min, section.value_span)?;
        Ok(range.with_whole_values(section.whole_values))
    }

    pub fn with_whole_values(mut self, whole: bool) -> Self {
        self.whole = whole;
        self
    }

    pub fn whole_values(&self) -> bool {
        self.whole
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn span(&self) -> f64 {
        self.span
    }

    /// Exclusive upper bound
    pub fn upper(&self) -> f64 {
        self.min + self.span
    }

    /// Draw a value using the thread-local generator
    pub fn sample(&self) -> f64 {
        self.sample_with(fastrand::f64())
    }

    /// Map a unit sample in `[0, 1)` into the range
    pub fn sample_with(&self, unit: f64) -> f64 {
        let value = self.min + unit * self.span;
        if self.whole {
            value.floor()
        } else {
            value
        }
    }
}

/// Simulated sensor bound to one topic and format for its lifetime
pub struct SensorSimulator<T: Transport> {
    config: SensorConfig,
    range: ValueRange,
    period: Duration,
    transport: Arc<T>,
    last_timestamp: AtomicI64,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Transport + 'static> SensorSimulator<T> {
    pub fn new(
        config: SensorConfig,
        range: ValueRange,
        period: Duration,
        transport: Arc<T>,
    ) -> Self {
        Self {
            config,
            range,
            period,
            transport,
            last_timestamp: AtomicI64::new(i64::MIN),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Readings successfully handed to the transport
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Cycles whose reading was dropped
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Produce the next reading
    pub fn tick(&self) -> Reading {
        Reading::from_validated(
            self.transport.client_id(),
            self.config.unit(),
            self.config.name(),
            self.range.sample(),
            self.next_timestamp(),
        )
    }

    /// Wall-clock milliseconds, never earlier than the previous reading
    fn next_timestamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let previous = self.last_timestamp.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    /// Run one tick → encode → publish cycle
    ///
    /// Returns the published reading. Nothing is retried or queued on failure.
    pub async fn publish_cycle(&self) -> PipelineResult<Reading> {
        let reading = self.tick();
        let message = encode(&reading, self.config.format())?;
        let payload = Envelope::wrap(&message)
            .to_bytes()
            .map_err(|e| PipelineError::Encode(EncodeError::Json(e)))?;

        if !self.transport.is_connected() {
            return Err(PipelineError::transport_unavailable(format!(
                "client {} is not connected",
                self.transport.client_id()
            )));
        }

        self.transport
            .publish(self.config.topic(), payload)
            .await
            .map_err(|e| PipelineError::TransportError(Box::new(e)))?;

        Ok(reading)
    }

    /// Publish on a fixed period until `shutdown` flips to true
    ///
    /// The first reading goes out one full period after start. A cycle that is
    /// already running when shutdown arrives is allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let span = crate::sensor_span!(
            sensor = %self.config.name(),
            topic = %self.config.topic(),
            format = %self.config.format()
        );

        async {
            info!(period_ms = self.period.as_millis() as u64, "Sensor started");

            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.run_cycle().await;
                    }
                }
            }

            info!(
                published = self.published_count(),
                dropped = self.dropped_count(),
                "Sensor stopped"
            );
        }
        .instrument(span)
        .await
    }

    async fn run_cycle(&self) {
        match self.publish_cycle().await {
            Ok(reading) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                info!(
                    value = reading.value(),
                    timestamp = reading.timestamp(),
                    "Published reading"
                );
            }
            Err(e @ PipelineError::TransportUnavailable { .. }) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(component = e.component(), error = %e, "Dropped reading");
            }
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                error!(component = e.component(), error = %e, "Publish cycle failed");
            }
        }
        debug!(
            published = self.published_count(),
            dropped = self.dropped_count(),
            "Cycle complete"
        );
    }
}
