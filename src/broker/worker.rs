//! Persistence worker
//!
//! Drains the ingest queue and runs one insert task per record, with at most
//! `max_in_flight` inserts outstanding. Each task owns its store session from
//! open to close.

use super::queue::IngestQueue;
use super::router::PersistenceRecord;
use super::stats::IngestStats;
use crate::storage::{DocumentStore, StorageError, StoreSession};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, Instrument};

/// Open a session, insert one record and close the session
///
/// The session is closed whether or not the insert succeeded. An insert error
/// takes precedence over a close error.
pub async fn persist<S: DocumentStore>(
    store: &S,
    collection: &str,
    record: &PersistenceRecord,
) -> Result<(), StorageError> {
    let mut session = store.open_session().await?;
    let inserted = session.insert_one(collection, record.document()).await;
    let closed = session.close().await;
    inserted?;
    closed
}

/// Handle to the background drain loop
pub struct PersistenceWorker {
    handle: JoinHandle<()>,
}

impl PersistenceWorker {
    /// Start draining `queue` into `store`
    pub fn spawn<S: DocumentStore>(
        queue: Arc<IngestQueue<PersistenceRecord>>,
        store: Arc<S>,
        collection: String,
        max_in_flight: usize,
        stats: Arc<IngestStats>,
    ) -> Self {
        let span = crate::ingest_span!(
            component = "broker",
            store = %store.describe(),
            collection = %collection
        );
        let handle = tokio::spawn(
            drain(queue, store, collection, max_in_flight.max(1), stats).instrument(span),
        );
        Self { handle }
    }

    /// Wait for the drain loop to finish
    ///
    /// The loop ends only after the queue is closed and every in-flight insert
    /// has completed.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!(component = "broker", error = %e, "Persistence worker terminated abnormally");
        }
    }
}

async fn drain<S: DocumentStore>(
    queue: Arc<IngestQueue<PersistenceRecord>>,
    store: Arc<S>,
    collection: String,
    max_in_flight: usize,
    stats: Arc<IngestStats>,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut inserts = JoinSet::new();

    info!(max_in_flight, "Persistence worker started");

    loop {
        tokio::select! {
            Some(joined) = inserts.join_next(), if !inserts.is_empty() => {
                log_join_failure(joined);
            }
            next = queue.pop() => {
                let Some(record) = next else {
                    break;
                };
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                inserts.spawn(insert_task(
                    store.clone(),
                    collection.clone(),
                    record,
                    stats.clone(),
                    permit,
                ));
            }
        }
    }

    let remaining = inserts.len();
    if remaining > 0 {
        debug!(remaining, "Waiting for in-flight inserts");
    }
    while let Some(joined) = inserts.join_next().await {
        log_join_failure(joined);
    }

    info!("Persistence worker stopped");
}

async fn insert_task<S: DocumentStore>(
    store: Arc<S>,
    collection: String,
    record: PersistenceRecord,
    stats: Arc<IngestStats>,
    _permit: OwnedSemaphorePermit,
) {
    let span = crate::storage_span!(component = "storage", topic = %record.topic());
    async {
        match persist(store.as_ref(), &collection, &record).await {
            Ok(()) => {
                stats.record_persisted();
                debug!("Record persisted");
            }
            Err(e) => {
                stats.record_failed();
                error!(error = %e, "Persistence failure; record lost");
            }
        }
    }
    .instrument(span)
    .await
}

fn log_join_failure(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(component = "storage", error = %e, "Insert task panicked");
    }
}
