//! SQLite document store
//!
//! Each session opens its own connection to the database, so concurrent inserts
//! never contend on a shared handle inside the process. The in-memory variant
//! uses a named shared-cache database kept alive by an anchor connection.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE documents (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     collection TEXT NOT NULL,
//!     topic TEXT,
//!     body TEXT NOT NULL,
//!     inserted_at_ms INTEGER NOT NULL
//! );
//! CREATE INDEX idx_documents_collection ON documents(collection);
//! ```

use super::{Document, DocumentStore, StorageError, StoreSession};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Document store persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteStore {
    target: PathBuf,
    anchor: Option<Arc<Mutex<Connection>>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let target = path.as_ref().to_path_buf();
        let schema_target = target.clone();

        blocking(move || {
            let conn = connect(&schema_target)?;
            init_schema(&conn)
        })
        .await?;

        Ok(Self {
            target,
            anchor: None,
        })
    }

    /// Open a private in-memory database that lives as long as this store
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let target = PathBuf::from(format!(
            "file:senml-{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        ));
        let schema_target = target.clone();

        let anchor = blocking(move || {
            let conn = connect(&schema_target)?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await?;

        Ok(Self {
            target,
            anchor: Some(Arc::new(Mutex::new(anchor))),
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.anchor.is_some()
    }

    /// Number of documents in `collection`
    pub async fn count(&self, collection: &str) -> Result<usize, StorageError> {
        let target = self.target.clone();
        let collection = collection.to_string();
        blocking(move || {
            let conn = connect(&target)?;
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    /// Documents in `collection`, oldest first
    pub async fn documents(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
        let target = self.target.clone();
        let collection = collection.to_string();
        blocking(move || {
            let conn = connect(&target)?;
            let mut stmt =
                conn.prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY id ASC")?;
            let bodies = stmt
                .query_map(params![collection], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            bodies
                .iter()
                .map(|body| serde_json::from_str(body).map_err(StorageError::from))
                .collect()
        })
        .await
    }
}

/// Session holding its own SQLite connection
pub struct SqliteSession {
    conn: Option<Arc<Mutex<Connection>>>,
}

#[async_trait]
impl DocumentStore for SqliteStore {
    type Session = SqliteSession;

    async fn open_session(&self) -> Result<Self::Session, StorageError> {
        let target = self.target.clone();
        let conn = blocking(move || connect(&target)).await?;
        Ok(SqliteSession {
            conn: Some(Arc::new(Mutex::new(conn))),
        })
    }

    fn describe(&self) -> String {
        if self.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}", self.target.display())
        }
    }
}

#[async_trait]
impl StoreSession for SqliteSession {
    async fn insert_one(
        &mut self,
        collection: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        let conn = self.conn.clone().ok_or(StorageError::SessionClosed)?;
        let collection = collection.to_string();
        let topic = document
            .get("topic")
            .and_then(|topic| topic.as_str())
            .map(str::to_string);
        let body = serde_json::to_string(document)?;
        let inserted_at = chrono::Utc::now().timestamp_millis();

        blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StorageError::Insert("connection lock poisoned".to_string()))?;
            conn.execute(
                "INSERT INTO documents (collection, topic, body, inserted_at_ms)
                 VALUES (?1, ?2, ?3, ?4)",
                params![collection, topic, body, inserted_at],
            )
            .map_err(|e| StorageError::Insert(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        // Dropping the last handle closes the connection
        self.conn = None;
        Ok(())
    }
}

fn connect(path: &Path) -> Result<Connection, StorageError> {
    let conn = Connection::open(path)
        .map_err(|e| StorageError::Connection(format!("{}: {e}", path.display())))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            topic TEXT,
            body TEXT NOT NULL,
            inserted_at_ms INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
        [],
    )?;
    Ok(())
}

async fn blocking<T, F>(work: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}
