//! In-memory table of supervised streams.
//!
//! A stream is "running" exactly when the registry holds a handle for its
//! id. The registry is rebuilt from nothing on every boot; recovery re-fills
//! it from the stored definitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::events::StopReason;
use crate::domain::StreamState;

/// Runtime handle of one supervised stream.
#[derive(Debug)]
pub struct StreamHandle {
    id: String,
    generation: u64,
    started_at: DateTime<Utc>,
    state: RwLock<StreamState>,
    pids: RwLock<Vec<u32>>,
    restarts: AtomicU32,
    stop: CancellationToken,
    stop_reason: Mutex<Option<StopReason>>,
    finished: CancellationToken,
}

impl StreamHandle {
    fn new(id: &str, generation: u64) -> Self {
        Self {
            id: id.to_string(),
            generation,
            started_at: Utc::now(),
            state: RwLock::new(StreamState::Idle),
            pids: RwLock::new(Vec::new()),
            restarts: AtomicU32::new(0),
            stop: CancellationToken::new(),
            stop_reason: Mutex::new(None),
            finished: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Distinguishes successive runs of the same stream id.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> StreamState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: StreamState) {
        let mut current = self.state.write();
        let previous = *current;
        if previous != state {
            debug!(stream_id = %self.id, from = %previous, to = %state, "Stream state changed");
            *current = state;
        }
    }

    pub fn pids(&self) -> Vec<u32> {
        self.pids.read().clone()
    }

    pub(crate) fn set_pids(&self, pids: Vec<u32>) {
        *self.pids.write() = pids;
    }

    /// Number of successful restarts after the first start.
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub(crate) fn record_restart(&self) -> u32 {
        self.restarts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Ask the supervising task to stop. The first reason given wins.
    pub fn request_stop(&self, reason: StopReason) {
        {
            let mut current = self.stop_reason.lock();
            if current.is_none() {
                *current = Some(reason);
            }
        }
        self.stop.cancel();
    }

    pub fn stop_requested(&self) -> Option<StopReason> {
        if self.stop.is_cancelled() {
            *self.stop_reason.lock()
        } else {
            None
        }
    }

    /// Resolves once a stop has been requested.
    pub async fn stop_signal(&self) {
        self.stop.cancelled().await
    }

    /// Resolves once the supervising task has released every process and
    /// left the registry.
    pub async fn finished(&self) {
        self.finished.cancelled().await
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.cancel();
    }
}

/// Process-wide table of stream id to runtime handle.
#[derive(Debug, Default)]
pub struct Registry {
    entries: DashMap<String, Arc<StreamHandle>>,
    next_generation: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh handle for `id`.
    ///
    /// Returns `None` when the id already has a live handle, so at most one
    /// supervising task exists per stream.
    pub fn register(&self, id: &str) -> Option<Arc<StreamHandle>> {
        match self.entries.entry(id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
                let handle = Arc::new(StreamHandle::new(id, generation));
                slot.insert(handle.clone());
                Some(handle)
            }
        }
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<StreamHandle>> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove `id` if its handle still belongs to `generation`.
    pub fn unregister(&self, id: &str, generation: u64) -> bool {
        self.entries
            .remove_if(id, |_, handle| handle.generation == generation)
            .is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn handles(&self) -> Vec<Arc<StreamHandle>> {
        self.entries.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
