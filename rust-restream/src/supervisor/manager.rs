//! Stream Manager: the operation surface over the store, registry and engine.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::events::{StopReason, StreamEvent};
use super::registry::{Registry, StreamHandle};
use super::settings::SupervisorSettings;
use super::task::{RegistrationGuard, SupervisorContext, supervise};
use crate::domain::{StreamDefinition, StreamState, StreamStatus, generate_stream_id};
use crate::process::StreamEngine;
use crate::store::ConfigStore;
use crate::{Error, Result};

/// Capacity of the lifecycle event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Supervises every configured stream.
///
/// The store says which streams *should* run; the registry says which
/// streams *are* running. Both are only mutated through this type and the
/// supervising tasks it spawns.
pub struct StreamManager {
    ctx: Arc<SupervisorContext>,
}

impl StreamManager {
    pub fn new(
        store: Arc<ConfigStore>,
        engine: Arc<dyn StreamEngine>,
        settings: SupervisorSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ctx: Arc::new(SupervisorContext {
                store,
                registry: Arc::new(Registry::new()),
                engine,
                settings,
                events,
            }),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.ctx.store
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.ctx.registry
    }

    pub fn engine(&self) -> &Arc<dyn StreamEngine> {
        &self.ctx.engine
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.ctx.settings
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.ctx.events.subscribe()
    }

    /// Number of registered (running) streams.
    pub fn running_count(&self) -> usize {
        self.ctx.registry.len()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.ctx.registry.is_running(id)
    }

    /// Validate and persist a new definition without starting it.
    ///
    /// A blank id is replaced by a generated one.
    pub async fn add_stream(&self, mut definition: StreamDefinition) -> Result<StreamDefinition> {
        if definition.id.trim().is_empty() {
            definition.id = generate_stream_id();
        }
        if definition.created_at.is_none() {
            definition.created_at = Some(chrono::Utc::now());
        }
        definition.validate()?;
        self.ctx.store.insert(definition.clone()).await?;
        info!(stream_id = %definition.id, name = %definition.display_name(), "Added stream");
        Ok(definition)
    }

    /// Persist a new definition and start it.
    pub async fn create_stream(&self, definition: StreamDefinition) -> Result<StreamDefinition> {
        let definition = self.add_stream(definition).await?;
        self.start_stream(&definition.id).await
    }

    /// Start supervising a stored stream and return its definition.
    ///
    /// Does nothing if the stream is already running. If the source is
    /// unusable or the encoder cannot be spawned, the stream goes straight to
    /// `Stopped` (its definition is retired) and the error is returned.
    pub async fn start_stream(&self, id: &str) -> Result<StreamDefinition> {
        // Register before reading the store: a concurrent stop either retires
        // the definition first (and we see it gone) or finds our handle.
        let Some(handle) = self.ctx.registry.register(id) else {
            debug!(stream_id = %id, "Stream already running");
            return self
                .ctx
                .store
                .get(id)
                .await
                .ok_or_else(|| Error::not_found("Stream", id));
        };
        let guard = RegistrationGuard::new(self.ctx.registry.clone(), handle.clone());

        let Some(mut definition) = self.ctx.store.get(id).await else {
            drop(guard);
            return Err(Error::not_found("Stream", id));
        };
        handle.set_state(StreamState::Starting);

        if !definition.enabled {
            self.ctx.store.set_enabled(id, true).await?;
            definition.enabled = true;
        }

        if let Err(e) = self.check_startable(&definition).await {
            return Err(self.abort_start(id, guard, e).await);
        }

        let group = match self.ctx.engine.launch(id, &definition).await {
            Ok(group) => group,
            Err(e) => return Err(self.abort_start(id, guard, e).await),
        };

        let pids = group.pids();
        info!(stream_id = %id, name = %definition.display_name(), pids = ?pids, "Started stream");
        self.ctx.emit(StreamEvent::Started {
            stream_id: id.to_string(),
            attempt: 1,
            pids,
        });

        tokio::spawn(supervise(self.ctx.clone(), guard, definition.clone(), group));
        Ok(definition)
    }

    async fn check_startable(&self, definition: &StreamDefinition) -> Result<()> {
        definition.validate()?;
        definition.parsed_source()?.check_available().await
    }

    /// Send a stream that never ran straight to `Stopped`.
    async fn abort_start(&self, id: &str, guard: RegistrationGuard, err: Error) -> Error {
        error!(stream_id = %id, error = %err, "Failed to start stream");
        self.ctx.emit(StreamEvent::StartFailed {
            stream_id: id.to_string(),
            error: err.to_string(),
        });
        self.ctx.retire_definition(id, StopReason::Failed).await;
        drop(guard);
        self.ctx.emit(StreamEvent::Stopped {
            stream_id: id.to_string(),
            reason: StopReason::Failed,
        });
        err
    }

    /// Stop a stream.
    ///
    /// The stored definition is retired first, so a supervising task that is
    /// about to decide on a restart sees the stop. Then the task is cancelled
    /// and awaited; when this returns no process of the stream is alive.
    /// Returns whether a running stream was stopped.
    pub async fn stop_stream(&self, id: &str) -> Result<bool> {
        self.ctx.retire_definition(id, StopReason::Requested).await;

        let Some(handle) = self.ctx.registry.lookup(id) else {
            debug!(stream_id = %id, "Stop requested for a stream that is not running");
            return Ok(false);
        };
        self.stop_handle(&handle, StopReason::Requested).await;
        Ok(true)
    }

    /// Stop a stream and delete its definition regardless of stop policy.
    ///
    /// Returns `NotFound` if the stream was neither stored nor running.
    pub async fn delete_stream(&self, id: &str) -> Result<()> {
        let removed = self.ctx.store.remove(id).await?;
        let stopped = self.stop_stream(id).await?;
        if !removed && !stopped {
            return Err(Error::not_found("Stream", id));
        }
        info!(stream_id = %id, "Deleted stream");
        Ok(())
    }

    async fn stop_handle(&self, handle: &StreamHandle, reason: StopReason) {
        handle.request_stop(reason);
        handle.finished().await;
    }

    /// Every stored definition with its runtime status.
    pub async fn list_streams(&self) -> Vec<StreamStatus> {
        self.ctx
            .store
            .list()
            .await
            .into_iter()
            .map(|definition| self.status_of(definition))
            .collect()
    }

    pub async fn get_stream(&self, id: &str) -> Result<StreamStatus> {
        self.ctx
            .store
            .get(id)
            .await
            .map(|definition| self.status_of(definition))
            .ok_or_else(|| Error::not_found("Stream", id))
    }

    /// Combine a definition with the live registry entry for its id.
    pub fn status_of(&self, definition: StreamDefinition) -> StreamStatus {
        match self.ctx.registry.lookup(&definition.id) {
            Some(handle) => StreamStatus {
                definition,
                running: true,
                state: Some(handle.state()),
                pids: handle.pids(),
                started_at: Some(handle.started_at()),
                restarts: handle.restarts(),
            },
            None => StreamStatus {
                definition,
                running: false,
                state: None,
                pids: Vec::new(),
                started_at: None,
                restarts: 0,
            },
        }
    }

    /// Start every enabled stored stream that is not already running.
    ///
    /// Individual failures are logged and skipped. Returns how many streams
    /// were started.
    pub async fn restore(&self) -> usize {
        let definitions = self.ctx.store.list().await;
        let total = definitions.len();
        let mut started = 0;

        for definition in definitions {
            if !definition.enabled || self.ctx.registry.is_running(&definition.id) {
                continue;
            }
            match self.start_stream(&definition.id).await {
                Ok(_) => started += 1,
                Err(e) => warn!(stream_id = %definition.id, error = %e, "Failed to restore stream"),
            }
        }

        info!(started, stored = total, "Restored streams");
        started
    }

    /// Snapshot of every stored definition.
    pub async fn export(&self) -> Vec<StreamDefinition> {
        self.ctx.store.list().await
    }

    /// Replace every definition with `definitions` and start the enabled ones.
    ///
    /// Nothing is touched if any definition is invalid or ids repeat.
    /// Returns how many streams were started.
    pub async fn import(&self, mut definitions: Vec<StreamDefinition>) -> Result<usize> {
        let mut seen = std::collections::HashSet::new();
        for definition in definitions.iter_mut() {
            if definition.id.trim().is_empty() {
                definition.id = generate_stream_id();
            }
            definition.validate()?;
            if !seen.insert(definition.id.clone()) {
                return Err(Error::validation(format!(
                    "Duplicate stream id in snapshot: {}",
                    definition.id
                )));
            }
        }

        self.stop_all(StopReason::Replaced).await;
        self.ctx.store.replace_all(definitions).await?;
        Ok(self.restore().await)
    }

    /// Stop every running stream, keeping definitions for the next boot.
    pub async fn shutdown(&self) {
        let stopped = self.stop_all(StopReason::Shutdown).await;
        info!(stopped, "Stream manager shut down");
    }

    async fn stop_all(&self, reason: StopReason) -> usize {
        let handles = self.ctx.registry.handles();
        for handle in &handles {
            handle.request_stop(reason);
        }
        futures::future::join_all(handles.iter().map(|h| h.finished())).await;
        handles.len()
    }
}
