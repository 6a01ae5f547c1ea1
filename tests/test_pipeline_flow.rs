//! Sensor to broker to store, with the monitor watching the same traffic


use senml_pipeline::broker::{BrokerRouter, IngestOutcome, RouterOptions};
use senml_pipeline::monitor::{decode_inbound, TelemetryMonitor};
use senml_pipeline::senml::PayloadFormat;
use senml_pipeline::sensor::{SensorSimulator, ValueRange};
use senml_pipeline::storage::{MemoryStore, StoreBackend};
use senml_pipeline::testing::mocks::MockTransport;
use senml_pipeline::transport::InboundMessage;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{sensor_config, test_config};

#[tokio::test]
async fn test_published_readings_reach_the_store_and_monitor() {
    let memory = MemoryStore::new();
    let store = Arc::new(StoreBackend::Memory(memory.clone()));
    let router = BrokerRouter::new(store, RouterOptions::from_config(&test_config()));
    let monitor = TelemetryMonitor::new();

    let sensors = [
        ("Bedroom", PayloadFormat::Json),
        ("Garage", PayloadFormat::Xml),
        ("LivingRoom", PayloadFormat::Exi),
        ("Basement", PayloadFormat::Json),
    ];

    let mut expected = Vec::new();
    for (topic, format) in sensors {
        let transport = Arc::new(MockTransport::new());
        let sim = SensorSimulator::new(
            sensor_config(topic, format),
            ValueRange::default(),
            Duration::from_secs(1),
            transport.clone(),
        );
        let reading = sim.publish_cycle().await.unwrap();

        for (topic, payload) in transport.published_messages().await {
            let message = InboundMessage::new(topic.clone(), payload.clone());
            let telemetry = monitor.observe(&message).unwrap();
            assert_eq!(telemetry.reading, reading);
            assert_eq!(telemetry.format, format);

            let outcome = router.on_publish(&topic, &payload);
            if topic == "Basement" {
                assert_eq!(outcome, IngestOutcome::Ignored);
            } else {
                assert_eq!(outcome, IngestOutcome::Queued);
                expected.push((topic, format));
            }
        }
    }
    let snapshot = router.shutdown().await;

    assert_eq!(snapshot.persisted, 3);
    assert_eq!(snapshot.ignored, 1);
    assert_eq!(monitor.decoded_count(), 4);

    let documents = memory.documents("logs").await;
    assert_eq!(documents.len(), 3);
    for (topic, format) in expected {
        let document = documents
            .iter()
            .find(|doc| doc["topic"] == topic.as_str())
            .unwrap();
        assert_eq!(document["contentType"], format.content_type());

        // The stored envelope still decodes
        let bytes = serde_json::to_vec(document).unwrap();
        let telemetry = decode_inbound(&InboundMessage::new(topic.clone(), bytes)).unwrap();
        assert_eq!(telemetry.format, format);
    }
}
