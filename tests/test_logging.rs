//! Tests for logging configuration and format parsing
//!
//! Exercises the pure settings functions; the global subscriber is installed at
//! most once per process so only its idempotence is checked.

use senml_pipeline::observability::logging::{init_logging, parse_level, LogFormat, LogSettings};
use std::collections::HashMap;
use tracing::Level;

fn settings_from(pairs: &[(&str, &str)]) -> LogSettings {
    let vars: HashMap<&str, &str> = pairs.iter().copied().collect();
    LogSettings::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
}

#[test]
fn test_log_format_parse_names() {
    assert!(matches!(LogFormat::parse("json"), LogFormat::Json));
    assert!(matches!(LogFormat::parse("PRETTY"), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("Compact"), LogFormat::Compact));
}

#[test]
fn test_log_format_parse_invalid_defaults_to_json() {
    assert!(matches!(LogFormat::parse("invalid"), LogFormat::Json));
    assert!(matches!(LogFormat::parse(""), LogFormat::Json));
    assert!(matches!(LogFormat::parse("xml"), LogFormat::Json));
}

#[test]
fn test_log_format_parse_whitespace() {
    assert!(matches!(LogFormat::parse("  pretty  "), LogFormat::Pretty));
    assert!(matches!(LogFormat::parse("compact\n"), LogFormat::Compact));
}

#[test]
fn test_parse_level() {
    assert_eq!(parse_level("error"), Level::ERROR);
    assert_eq!(parse_level("Warn"), Level::WARN);
    assert_eq!(parse_level("DEBUG"), Level::DEBUG);
    assert_eq!(parse_level(" trace "), Level::TRACE);
    assert_eq!(parse_level("verbose"), Level::INFO);
}

#[test]
fn test_settings_defaults() {
    let settings = settings_from(&[]);
    assert_eq!(settings.level, Level::INFO);
    assert_eq!(settings.format, LogFormat::Json);
    assert!(!settings.include_spans);
    assert_eq!(settings.filter_override, None);
}

#[test]
fn test_settings_from_environment_values() {
    let settings = settings_from(&[
        ("LOG_LEVEL", "warn"),
        ("LOG_FORMAT", "compact"),
        ("LOG_SPANS", "TRUE"),
        ("RUST_LOG", "senml_pipeline=trace"),
    ]);
    assert_eq!(settings.level, Level::WARN);
    assert_eq!(settings.format, LogFormat::Compact);
    assert!(settings.include_spans);
    assert_eq!(
        settings.filter_override.as_deref(),
        Some("senml_pipeline=trace")
    );
}

#[test]
fn test_blank_rust_log_is_ignored() {
    let settings = settings_from(&[("RUST_LOG", "  ")]);
    assert_eq!(settings.filter_override, None);
}

#[test]
fn test_verbosity_raises_level() {
    let base = settings_from(&[("LOG_LEVEL", "error")]);
    assert_eq!(base.clone().with_verbosity(0).level, Level::ERROR);
    assert_eq!(base.clone().with_verbosity(1).level, Level::DEBUG);
    assert_eq!(base.with_verbosity(3).level, Level::TRACE);
}

#[test]
fn test_filter_quiets_dependencies() {
    let filter = settings_from(&[("LOG_LEVEL", "debug")]).filter().to_string();
    assert!(filter.contains("rumqttc=warn"));
    assert!(filter.contains("rusqlite=warn"));
}

#[test]
fn test_rust_log_replaces_default_filter() {
    let filter = settings_from(&[("RUST_LOG", "senml_pipeline=trace")])
        .filter()
        .to_string();
    assert!(filter.contains("senml_pipeline=trace"));
    assert!(!filter.contains("rumqttc"));
}

#[test]
fn test_init_logging_is_idempotent() {
    let settings = settings_from(&[("LOG_FORMAT", "compact")]);
    init_logging(&settings);
    assert!(!init_logging(&settings));
}
