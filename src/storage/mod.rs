//! Document storage used by the persistence sink
//!
//! A [`DocumentStore`] hands out short-lived [`StoreSession`]s. The broker opens
//! one session per record, inserts a single document and closes it again, so a
//! store never has to share a connection between concurrent inserts.
//!
//! Backends:
//!
//! - [`MemoryStore`] (`memory://`) keeps documents in process, for tests and demos
//! - [`SqliteStore`] (`sqlite://<path>` or `sqlite::memory:`) appends documents
//!   to a SQLite database

pub mod memory;
pub mod sqlite;

pub use memory::{MemorySession, MemoryStore};
pub use sqlite::{SqliteSession, SqliteStore};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// A JSON object as stored by the sink
pub type Document = Map<String, Value>;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid database URL '{0}'")]
    InvalidUrl(String),
    #[error("Failed to open store session: {0}")]
    Connection(String),
    #[error("Insert failed: {0}")]
    Insert(String),
    #[error("Store session already closed")]
    SessionClosed,
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage task failed: {0}")]
    Task(String),
}

/// A store that can open independent sessions
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    type Session: StoreSession;

    /// Open a new session; each call returns an independent handle
    async fn open_session(&self) -> Result<Self::Session, StorageError>;

    /// Short human-readable location used in log lines
    fn describe(&self) -> String;
}

/// A single store session
///
/// `close` must be called on every exit path; calling it twice is harmless.
#[async_trait]
pub trait StoreSession: Send + 'static {
    async fn insert_one(&mut self, collection: &str, document: &Document)
        -> Result<(), StorageError>;

    async fn close(&mut self) -> Result<(), StorageError>;
}

/// Backend selected from a database URL at runtime
#[derive(Debug, Clone)]
pub enum StoreBackend {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

/// Session of whichever backend is in use
pub enum BackendSession {
    Memory(MemorySession),
    Sqlite(SqliteSession),
}

impl StoreBackend {
    /// Build a backend from `memory://`, `sqlite://<path>` or `sqlite::memory:`
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let url = url.trim();
        if url == "sqlite::memory:" {
            return Ok(Self::Sqlite(SqliteStore::open_in_memory().await?));
        }

        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;

        match scheme {
            "memory" => Ok(Self::Memory(MemoryStore::new())),
            "sqlite" if !rest.is_empty() => Ok(Self::Sqlite(SqliteStore::open(rest).await?)),
            _ => Err(StorageError::InvalidUrl(url.to_string())),
        }
    }
}

#[async_trait]
impl DocumentStore for StoreBackend {
    type Session = BackendSession;

    async fn open_session(&self) -> Result<Self::Session, StorageError> {
        match self {
            Self::Memory(store) => Ok(BackendSession::Memory(store.open_session().await?)),
            Self::Sqlite(store) => Ok(BackendSession::Sqlite(store.open_session().await?)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Memory(store) => store.describe(),
            Self::Sqlite(store) => store.describe(),
        }
    }
}

#[async_trait]
impl StoreSession for BackendSession {
    async fn insert_one(
        &mut self,
        collection: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        match self {
            Self::Memory(session) => session.insert_one(collection, document).await,
            Self::Sqlite(session) => session.insert_one(collection, document).await,
        }
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        match self {
            Self::Memory(session) => session.close().await,
            Self::Sqlite(session) => session.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory() {
        let backend = StoreBackend::connect("memory://").await.unwrap();
        assert!(matches!(backend, StoreBackend::Memory(_)));
        assert_eq!(backend.describe(), "memory://");
    }

    #[tokio::test]
    async fn test_connect_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.db");
        let url = format!("sqlite://{}", path.display());

        let backend = StoreBackend::connect(&url).await.unwrap();
        assert!(matches!(backend, StoreBackend::Sqlite(_)));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_connect_sqlite_in_memory() {
        let backend = StoreBackend::connect("sqlite::memory:").await.unwrap();
        assert_eq!(backend.describe(), "sqlite::memory:");
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        for url in ["mongodb://localhost:27017/iot", "not a url", "sqlite://"] {
            assert!(
                matches!(
                    StoreBackend::connect(url).await,
                    Err(StorageError::InvalidUrl(_))
                ),
                "{url} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_backend_session_round_trip() {
        let backend = StoreBackend::connect("memory://").await.unwrap();
        let mut session = backend.open_session().await.unwrap();

        let mut document = Document::new();
        document.insert("topic".to_string(), Value::from("Garage"));
        session.insert_one("logs", &document).await.unwrap();
        session.close().await.unwrap();

        let StoreBackend::Memory(store) = backend else {
            panic!("expected memory backend");
        };
        assert_eq!(store.documents("logs").await, vec![document]);
    }
}
