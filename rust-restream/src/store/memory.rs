//! In-process stream store.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::StreamStore;
use crate::Result;
use crate::domain::StreamDefinition;

/// A [`StreamStore`] that keeps the list in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    streams: RwLock<Vec<StreamDefinition>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreamStore for MemoryStore {
    async fn load(&self) -> Vec<StreamDefinition> {
        self.streams.read().clone()
    }

    async fn save(&self, streams: &[StreamDefinition]) -> Result<()> {
        *self.streams.write() = streams.to_vec();
        Ok(())
    }
}
