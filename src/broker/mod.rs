//! Broker-side ingestion
//!
//! - [`router`] - allow-list filtering and record construction
//! - [`queue`] - bounded hand-off between ingestion and persistence
//! - [`worker`] - concurrent, session-per-record inserts
//! - [`stats`] - ingest counters

pub mod queue;
pub mod router;
pub mod stats;
pub mod worker;

pub use queue::{IngestQueue, OverflowPolicy, PushOutcome};
pub use router::{BrokerRouter, IngestOutcome, PersistenceRecord, RouterOptions};
pub use stats::{IngestSnapshot, IngestStats};
pub use worker::{persist, PersistenceWorker};
