//! Durable storage of stream definitions.
//!
//! The store is the single source of truth for which streams should be
//! running. Backends implement [`StreamStore`], a whole-collection load/save
//! contract. [`ConfigStore`] layers id-keyed operations on top and runs every
//! read-modify-write behind one writer lock, so concurrent stream lifecycles
//! never lose each other's updates.

mod json_file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::StreamDefinition;
use crate::{Error, Result};

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Backing medium for the stream definition list.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Load every stored definition.
    ///
    /// Never fails: missing or unreadable data yields an empty list.
    async fn load(&self) -> Vec<StreamDefinition>;

    /// Replace the stored list with `streams`.
    ///
    /// Readers never observe a partially written list.
    async fn save(&self, streams: &[StreamDefinition]) -> Result<()>;
}

/// Serialized, id-keyed access to a [`StreamStore`].
pub struct ConfigStore {
    backend: Arc<dyn StreamStore>,
    writer: Mutex<()>,
}

impl ConfigStore {
    /// Wrap a backend.
    pub fn new(backend: Arc<dyn StreamStore>) -> Self {
        Self {
            backend,
            writer: Mutex::new(()),
        }
    }

    /// Convenience constructor for an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// All stored definitions, in stored order.
    pub async fn list(&self) -> Vec<StreamDefinition> {
        self.backend.load().await
    }

    /// Look up one definition. Always re-reads the backend.
    pub async fn get(&self, id: &str) -> Option<StreamDefinition> {
        self.backend.load().await.into_iter().find(|s| s.id == id)
    }

    /// Whether a definition with this id is stored.
    pub async fn contains(&self, id: &str) -> bool {
        self.get(id).await.is_some()
    }

    /// Append a new definition. Duplicate ids are rejected.
    pub async fn insert(&self, definition: StreamDefinition) -> Result<()> {
        let _guard = self.writer.lock().await;
        let mut streams = self.backend.load().await;
        if streams.iter().any(|s| s.id == definition.id) {
            return Err(Error::Conflict(format!(
                "stream {} already exists",
                definition.id
            )));
        }
        debug!(stream_id = %definition.id, "Storing stream definition");
        streams.push(definition);
        self.backend.save(&streams).await
    }

    /// Remove a definition by id. Returns whether anything was removed.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let mut streams = self.backend.load().await;
        let before = streams.len();
        streams.retain(|s| s.id != id);
        if streams.len() == before {
            return Ok(false);
        }
        debug!(stream_id = %id, "Removed stream definition");
        self.backend.save(&streams).await?;
        Ok(true)
    }

    /// Apply `f` to the definition with this id and persist the result.
    ///
    /// Returns `false` when no such definition exists.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut StreamDefinition) + Send,
    {
        let _guard = self.writer.lock().await;
        let mut streams = self.backend.load().await;
        let Some(definition) = streams.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        f(definition);
        self.backend.save(&streams).await?;
        Ok(true)
    }

    /// Flip the `enabled` flag of a stored definition.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool> {
        self.update(id, |s| s.enabled = enabled).await
    }

    /// Replace the whole collection.
    pub async fn replace_all(&self, streams: Vec<StreamDefinition>) -> Result<()> {
        let _guard = self.writer.lock().await;
        info!(count = streams.len(), "Replacing stored stream definitions");
        self.backend.save(&streams).await
    }
}
