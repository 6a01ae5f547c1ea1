//! Sensor simulator tests against a mock transport


use proptest::prelude::*;
use senml_pipeline::error::PipelineError;
use senml_pipeline::senml::{decode, Envelope, PayloadFormat};
use senml_pipeline::sensor::{validate, SensorDraft, SensorSimulator, ValidationError, ValueRange};
use senml_pipeline::testing::mocks::MockTransport;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{sensor_config, test_config};
use tokio::sync::watch;

fn simulator(
    topic: &str,
    format: PayloadFormat,
    transport: Arc<MockTransport>,
) -> SensorSimulator<MockTransport> {
    SensorSimulator::new(
        sensor_config(topic, format),
        ValueRange::default(),
        Duration::from_millis(10),
        transport,
    )
}

#[test]
fn test_ten_thousand_values_stay_in_range() {
    let range = ValueRange::default();
    for _ in 0..10_000 {
        let value = range.sample();
        assert!((-5.0..30.0).contains(&value), "value {value} out of range");
    }
}

#[test]
fn test_ticks_stay_in_range_and_carry_identity() {
    let transport = Arc::new(MockTransport::with_client_id("garage-temp-0a1b2c3d4e5f"));
    let sim = simulator("Garage", PayloadFormat::Json, transport);

    let mut previous = i64::MIN;
    for _ in 0..10_000 {
        let reading = sim.tick();
        assert!(reading.value() >= -5.0 && reading.value() < 30.0);
        assert!(reading.timestamp() >= previous);
        assert_eq!(reading.base_name(), "garage-temp-0a1b2c3d4e5f");
        assert_eq!(reading.name(), "garage-temp");
        assert_eq!(reading.unit(), "Cel");
        previous = reading.timestamp();
    }
}

proptest! {
    #[test]
    fn sample_with_maps_unit_interval_into_range(
        min in -1.0e6f64..1.0e6,
        span in 1.0e-3f64..1.0e6,
        unit in 0.0f64..1.0,
    ) {
        let range = ValueRange::new(min, span).unwrap();
        let value = range.sample_with(unit);
        prop_assert!(value >= min);
        prop_assert!(value <= range.upper());
    }
}

#[tokio::test]
async fn test_published_payload_decodes_to_the_tick() {
    for format in PayloadFormat::ALL {
        let transport = Arc::new(MockTransport::new());
        let sim = simulator("Bedroom", format, transport.clone());

        let reading = sim.publish_cycle().await.unwrap();

        let published = transport.published_messages().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "Bedroom");
        let message = Envelope::from_slice(&published[0].1)
            .unwrap()
            .into_message()
            .unwrap();
        assert_eq!(message.format(), format);
        assert_eq!(decode(&message).unwrap(), reading);
    }
}

#[tokio::test]
async fn test_unpersisted_topic_is_publishable() {
    let transport = Arc::new(MockTransport::new());
    let sim = simulator("Basement", PayloadFormat::Xml, transport.clone());

    sim.publish_cycle().await.unwrap();
    assert_eq!(transport.published_messages().await[0].0, "Basement");
}

#[tokio::test]
async fn test_disconnected_transport_drops_without_retry() {
    let transport = Arc::new(MockTransport::disconnected());
    let sim = simulator("Garage", PayloadFormat::Exi, transport.clone());

    for _ in 0..3 {
        let result = sim.publish_cycle().await;
        assert!(matches!(
            result,
            Err(PipelineError::TransportUnavailable { .. })
        ));
    }
    assert!(transport.published_messages().await.is_empty());

    transport.set_connected(true);
    sim.publish_cycle().await.unwrap();
    assert_eq!(transport.published_messages().await.len(), 1);
}

#[tokio::test]
async fn test_publish_failure_is_reported_as_transport_error() {
    let transport = Arc::new(MockTransport::with_failure());
    let sim = simulator("Garage", PayloadFormat::Json, transport.clone());

    let result = sim.publish_cycle().await;
    match result {
        Err(e @ PipelineError::TransportError(_)) => assert_eq!(e.component(), "transport"),
        other => panic!("Expected TransportError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_run_publishes_periodically_until_shutdown() {
    let transport = Arc::new(MockTransport::new());
    let sim = Arc::new(simulator("LivingRoom", PayloadFormat::Json, transport.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = sim.clone();
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(75)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    let published = transport.published_messages().await.len() as u64;
    assert!(published >= 2, "expected several cycles, got {published}");
    assert_eq!(sim.published_count(), published);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(transport.published_messages().await.len() as u64, published);
}

#[tokio::test]
async fn test_run_does_not_publish_before_first_period() {
    let transport = Arc::new(MockTransport::new());
    let sim = Arc::new(SensorSimulator::new(
        sensor_config("Garage", PayloadFormat::Json),
        ValueRange::default(),
        Duration::from_secs(60),
        transport.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = sim.clone();
    let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(transport.published_messages().await.is_empty());
}

#[test]
fn test_validate_rejects_bad_setup() {
    let topics = test_config().topics;
    let good = SensorDraft {
        name: "garage-temp".to_string(),
        topic: "Garage".to_string(),
        unit: "Cel".to_string(),
        format: "senml+json".to_string(),
    };
    assert!(validate(&good, &topics).is_ok());

    let cases = [
        (
            SensorDraft {
                name: " ".to_string(),
                ..good.clone()
            },
            "name",
        ),
        (
            SensorDraft {
                unit: String::new(),
                ..good.clone()
            },
            "unit",
        ),
        (
            SensorDraft {
                topic: "Attic".to_string(),
                ..good.clone()
            },
            "topic",
        ),
        (
            SensorDraft {
                format: "senml+cbor".to_string(),
                ..good.clone()
            },
            "format",
        ),
    ];

    for (draft, field) in cases {
        let error = validate(&draft, &topics).unwrap_err();
        let matched = match field {
            "name" => matches!(error, ValidationError::EmptyName),
            "unit" => matches!(error, ValidationError::EmptyUnit),
            "topic" => matches!(error, ValidationError::UnknownTopic { .. }),
            _ => matches!(error, ValidationError::UnsupportedFormat { .. }),
        };
        assert!(matched, "{field}: unexpected {error:?}");
    }
}
