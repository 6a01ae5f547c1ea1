//! Structured logging built on `tracing`
//!
//! Every role (sensor, broker, monitor) initialises logging once at startup and
//! then logs through spans created by the macros below, so each line carries its
//! component context.
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG or TRACE (default INFO)
//! - `LOG_FORMAT`: json, pretty or compact (default json)
//! - `LOG_SPANS`: `true` to emit span open/close events (default false)
//! - `RUST_LOG`: full filter override in env_logger syntax
//!
//! ```bash
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG senml-pipeline broker
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies whose chatter is capped at warn
const QUIET_TARGETS: [&str; 3] = ["rumqttc", "tokio", "rusqlite"];

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Multi-line, colored
    Pretty,
    /// Single-line, colored
    Compact,
}

impl LogFormat {
    /// Parse a format name; unknown names fall back to JSON
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub include_spans: bool,
    /// Raw `RUST_LOG` value, when set
    pub filter_override: Option<String>,
}

impl LogSettings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let level = lookup("LOG_LEVEL")
            .map(|value| parse_level(&value))
            .unwrap_or(Level::INFO);
        let format = lookup("LOG_FORMAT")
            .map(|value| LogFormat::parse(&value))
            .unwrap_or(LogFormat::Json);
        let include_spans = lookup("LOG_SPANS")
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let filter_override = lookup("RUST_LOG").filter(|value| !value.trim().is_empty());

        Self {
            level,
            format,
            include_spans,
            filter_override,
        }
    }

    /// Verbosity bump from repeated `-v` flags: 1 = DEBUG, 2+ = TRACE
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        self.level = match verbose {
            0 => self.level,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        self
    }

    /// Filter for these settings; `RUST_LOG` wins when present
    pub fn filter(&self) -> EnvFilter {
        if let Some(raw) = &self.filter_override {
            return EnvFilter::new(raw);
        }

        QUIET_TARGETS
            .iter()
            .filter_map(|target| format!("{target}=warn").parse().ok())
            .fold(EnvFilter::new(self.level.to_string()), |filter, directive| {
                filter.add_directive(directive)
            })
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Parse a level name; unknown names fall back to INFO
pub fn parse_level(value: &str) -> Level {
    match value.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Install the global subscriber
///
/// Returns false when a subscriber was already installed.
pub fn init_logging(settings: &LogSettings) -> bool {
    let subscriber = tracing_subscriber::registry().with(settings.filter());

    let installed = match settings.format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_span_events(settings.span_events()))
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_span_events(settings.span_events()),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_span_events(settings.span_events()),
            )
            .try_init(),
    };

    installed.is_ok()
}

/// Initialise logging from environment variables
pub fn init_default_logging() -> bool {
    init_logging(&LogSettings::from_env())
}

/// Span for one simulated sensor
#[macro_export]
macro_rules! sensor_span {
    ($($field:tt)*) => {
        tracing::info_span!("sensor", $($field)*)
    };
}

/// Span for broker ingestion
#[macro_export]
macro_rules! ingest_span {
    ($($field:tt)*) => {
        tracing::info_span!("ingest", $($field)*)
    };
}

/// Span for an MQTT operation
#[macro_export]
macro_rules! mqtt_span {
    ($($field:tt)*) => {
        tracing::info_span!("mqtt_operation", $($field)*)
    };
}

/// Span for a single persistence insert
#[macro_export]
macro_rules! storage_span {
    ($($field:tt)*) => {
        tracing::info_span!("storage", $($field)*)
    };
}

pub use {ingest_span, mqtt_span, sensor_span, storage_span};
