//! In-process document store

use super::{Document, DocumentStore, StorageError, StoreSession};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Collections = Arc<Mutex<HashMap<String, Vec<Document>>>>;

/// Document store backed by a shared map of collections
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    collections: Collections,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one collection in insertion order
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

/// Session writing into a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession {
    collections: Option<Collections>,
}

#[async_trait]
impl DocumentStore for MemoryStore {
    type Session = MemorySession;

    async fn open_session(&self) -> Result<Self::Session, StorageError> {
        Ok(MemorySession {
            collections: Some(self.collections.clone()),
        })
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn insert_one(
        &mut self,
        collection: &str,
        document: &Document,
    ) -> Result<(), StorageError> {
        let collections = self
            .collections
            .as_ref()
            .ok_or(StorageError::SessionClosed)?;
        collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.collections = None;
        Ok(())
    }
}
