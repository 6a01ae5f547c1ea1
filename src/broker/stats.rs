//! Ingest counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the router and persistence tasks
#[derive(Debug, Default)]
pub struct IngestStats {
    ignored: AtomicU64,
    malformed: AtomicU64,
    queued: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSnapshot {
    pub ignored: u64,
    pub malformed: u64,
    pub queued: u64,
    /// Records evicted or rejected by the overflow policy
    pub dropped: u64,
    pub persisted: u64,
    pub failed: u64,
}

impl IngestSnapshot {
    /// Records handed to the queue that have not yet reached a final outcome
    pub fn pending(&self) -> u64 {
        self.queued
            .saturating_sub(self.dropped)
            .saturating_sub(self.persisted)
            .saturating_sub(self.failed)
    }
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            ignored: self.ignored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
