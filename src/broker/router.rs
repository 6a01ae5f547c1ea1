//! Broker router
//!
//! Observes every published packet, keeps the ones whose topic is on the
//! persistence allow-list and hands them to the persistence worker through the
//! bounded ingest queue. Ingestion itself never waits on storage.

use super::queue::{IngestQueue, OverflowPolicy, PushOutcome};
use super::stats::{IngestSnapshot, IngestStats};
use super::worker::PersistenceWorker;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::storage::{Document, DocumentStore};
use crate::transport::InboundMessage;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn, Instrument};

/// Parsed packet plus the topic it arrived on
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceRecord {
    topic: String,
    document: Document,
}

impl PersistenceRecord {
    /// Parse a raw payload and attach `"topic"`
    ///
    /// The payload must be a JSON object. An existing `topic` key is replaced.
    pub fn from_payload(topic: &str, payload: &[u8]) -> PipelineResult<Self> {
        let parsed: Value = serde_json::from_slice(payload)
            .map_err(|e| PipelineError::malformed_payload(topic, e.to_string()))?;

        let Value::Object(mut document) = parsed else {
            return Err(PipelineError::malformed_payload(
                topic,
                "payload is not a JSON object",
            ));
        };

        document.insert("topic".to_string(), Value::String(topic.to_string()));
        Ok(Self {
            topic: topic.to_string(),
            document,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }
}

/// What `on_publish` did with a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Topic is not persisted
    Ignored,
    /// Payload was not a JSON object
    Malformed,
    /// Record is waiting for persistence
    Queued,
    /// Record queued after the oldest pending record was evicted
    Displaced,
    /// Record dropped: queue full under drop-newest, or router shut down
    Rejected,
}

/// Router tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RouterOptions {
    pub persisted_topics: Vec<String>,
    pub collection: String,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub overflow: OverflowPolicy,
}

impl RouterOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            persisted_topics: config.topics.persisted.clone(),
            collection: config.storage.collection.clone(),
            queue_capacity: config.broker.queue_capacity,
            max_in_flight: config.broker.max_in_flight,
            overflow: config.broker.overflow,
        }
    }
}

/// Allow-list filter in front of the persistence sink
pub struct BrokerRouter<S: DocumentStore> {
    allow_list: HashSet<String>,
    queue: Arc<IngestQueue<PersistenceRecord>>,
    stats: Arc<IngestStats>,
    store: Arc<S>,
    worker: Mutex<Option<PersistenceWorker>>,
}

impl<S: DocumentStore> BrokerRouter<S> {
    /// Build the router and start its persistence worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<S>, options: RouterOptions) -> Self {
        let queue = Arc::new(IngestQueue::new(options.queue_capacity, options.overflow));
        let stats = Arc::new(IngestStats::new());
        let worker = PersistenceWorker::spawn(
            queue.clone(),
            store.clone(),
            options.collection,
            options.max_in_flight,
            stats.clone(),
        );

        Self {
            allow_list: options.persisted_topics.into_iter().collect(),
            queue,
            stats,
            store,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn is_persisted(&self, topic: &str) -> bool {
        self.allow_list.contains(topic)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stats(&self) -> IngestSnapshot {
        self.stats.snapshot()
    }

    /// Records waiting for a persistence slot
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Route one published packet
    ///
    /// Synchronous and non-blocking; every outcome is final for this packet.
    pub fn on_publish(&self, topic: &str, payload: &[u8]) -> IngestOutcome {
        if !self.is_persisted(topic) {
            self.stats.record_ignored();
            info!(component = "broker", topic = %topic, "Non-persisted topic");
            return IngestOutcome::Ignored;
        }

        let record = match PersistenceRecord::from_payload(topic, payload) {
            Ok(record) => record,
            Err(e) => {
                self.stats.record_malformed();
                error!(
                    component = e.component(),
                    topic = %topic,
                    bytes = payload.len(),
                    error = %e,
                    "MalformedPayload"
                );
                return IngestOutcome::Malformed;
            }
        };

        match self.queue.push(record) {
            PushOutcome::Accepted => {
                self.stats.record_queued();
                IngestOutcome::Queued
            }
            PushOutcome::Displaced(evicted) => {
                self.stats.record_queued();
                self.stats.record_dropped();
                warn!(
                    component = "broker",
                    topic = %topic,
                    evicted_topic = %evicted.topic(),
                    capacity = self.queue.capacity(),
                    "Ingest queue full; evicted oldest pending record"
                );
                IngestOutcome::Displaced
            }
            PushOutcome::Rejected(_) => {
                self.stats.record_dropped();
                warn!(
                    component = "broker",
                    topic = %topic,
                    capacity = self.queue.capacity(),
                    "Ingest queue full; rejected record"
                );
                IngestOutcome::Rejected
            }
            PushOutcome::Closed(_) => {
                self.stats.record_dropped();
                warn!(component = "broker", topic = %topic, "Router shut down; rejected record");
                IngestOutcome::Rejected
            }
        }
    }

    /// Route inbound messages until the channel closes or `shutdown` flips
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let span = crate::ingest_span!(component = "broker", store = %self.store.describe());

        async {
            info!(topics = ?self.allow_list, "Broker router started");
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
                    message = inbound.recv() => {
                        let Some(message) = message else {
                            info!("Inbound channel closed");
                            break;
                        };
                        self.on_publish(&message.topic, &message.payload);
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Stop accepting packets, drain pending records and wait for in-flight inserts
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) -> IngestSnapshot {
        self.queue.close();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            info!(
                component = "broker",
                pending = self.queue.len(),
                "Draining ingest queue"
            );
            worker.join().await;
        }

        let snapshot = self.stats();
        info!(
            component = "broker",
            ignored = snapshot.ignored,
            malformed = snapshot.malformed,
            queued = snapshot.queued,
            dropped = snapshot.dropped,
            persisted = snapshot.persisted,
            failed = snapshot.failed,
            "Broker router stopped"
        );
        snapshot
    }
}
