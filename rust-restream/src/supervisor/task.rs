//! The per-stream supervising task.
//!
//! One task owns the process group of one stream for the whole life of the
//! stream. It waits for the group to exit, decides whether to restart, and
//! performs the terminal cleanup exactly once.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{StopReason, StreamEvent};
use super::registry::{Registry, StreamHandle};
use super::settings::{StopPolicy, SupervisorSettings};
use crate::domain::{StreamDefinition, StreamState};
use crate::process::{ProcessGroup, StreamEngine};
use crate::store::ConfigStore;

/// Shared dependencies of every supervising task.
pub(crate) struct SupervisorContext {
    pub store: Arc<ConfigStore>,
    pub registry: Arc<Registry>,
    pub engine: Arc<dyn StreamEngine>,
    pub settings: SupervisorSettings,
    pub events: broadcast::Sender<StreamEvent>,
}

impl SupervisorContext {
    pub fn emit(&self, event: StreamEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Apply the stop policy to the stored definition.
    ///
    /// Idempotent: the definition may already be gone.
    pub async fn retire_definition(&self, id: &str, reason: StopReason) {
        if reason.keeps_definition() {
            return;
        }
        let result = match self.settings.stop_policy {
            StopPolicy::Delete => self.store.remove(id).await,
            StopPolicy::Retain => self.store.set_enabled(id, false).await,
        };
        match result {
            Ok(true) => debug!(stream_id = %id, policy = %self.settings.stop_policy, "Retired stream definition"),
            Ok(false) => {}
            Err(e) => warn!(stream_id = %id, error = %e, "Failed to retire stream definition"),
        }
    }
}

/// Releases the registry slot when dropped.
///
/// Held by whoever currently owns a registered handle, so the slot is freed
/// on every exit path, including early returns and panics.
pub(crate) struct RegistrationGuard {
    registry: Arc<Registry>,
    handle: Arc<StreamHandle>,
}

impl RegistrationGuard {
    pub fn new(registry: Arc<Registry>, handle: Arc<StreamHandle>) -> Self {
        Self { registry, handle }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.handle.set_pids(Vec::new());
        self.handle.set_state(StreamState::Stopped);
        self.registry
            .unregister(self.handle.id(), self.handle.generation());
        self.handle.mark_finished();
    }
}

/// Supervise a freshly started stream until it reaches `Stopped`.
pub(crate) async fn supervise(
    ctx: Arc<SupervisorContext>,
    guard: RegistrationGuard,
    mut definition: StreamDefinition,
    group: ProcessGroup,
) {
    let handle = guard.handle.clone();
    let id = handle.id().to_string();
    let mut current = Some(group);
    let mut attempt: u32 = 1;

    let reason = loop {
        if let Some(mut group) = current.take() {
            handle.set_pids(group.pids());
            handle.set_state(StreamState::Running);

            tokio::select! {
                biased;
                _ = handle.stop_signal() => {
                    let reason = handle.stop_requested().unwrap_or(StopReason::Requested);
                    info!(stream_id = %id, reason = %reason, "Stopping encoder processes");
                    group.terminate(ctx.settings.stop_grace).await;
                    break reason;
                }
                exits = group.wait() => {
                    handle.set_pids(Vec::new());
                    handle.set_state(StreamState::Exited);
                    let clean = exits.iter().all(|e| e.success);
                    if clean {
                        info!(stream_id = %id, attempt, "Encoder exited");
                    } else {
                        let last_line = group.recent_output().pop().unwrap_or_default();
                        warn!(stream_id = %id, attempt, exits = ?exits, last_output = %last_line, "Encoder exited with failure");
                    }
                    ctx.emit(StreamEvent::Exited { stream_id: id.clone(), exits });
                }
            }
        }

        // Exited: decide whether to go around again.
        if let Some(reason) = handle.stop_requested() {
            break reason;
        }
        if !definition.looping {
            break StopReason::Completed;
        }
        match ctx.store.get(&id).await {
            Some(latest) if latest.enabled => definition = latest,
            _ => {
                debug!(stream_id = %id, "Definition gone, not restarting");
                break StopReason::Removed;
            }
        }
        if !definition.looping {
            break StopReason::Completed;
        }

        handle.set_state(StreamState::Restarting);
        let delay = ctx.settings.restart_cooldown;
        ctx.emit(StreamEvent::Restarting {
            stream_id: id.clone(),
            attempt: attempt + 1,
            delay_ms: delay.as_millis() as u64,
        });
        tokio::select! {
            biased;
            _ = handle.stop_signal() => {
                break handle.stop_requested().unwrap_or(StopReason::Requested);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        // A stop may have landed in the store while we slept.
        if !ctx.store.get(&id).await.is_some_and(|d| d.enabled) {
            break StopReason::Removed;
        }

        attempt += 1;
        handle.set_state(StreamState::Starting);
        match ctx.engine.launch(&id, &definition).await {
            Ok(group) => {
                let restarts = handle.record_restart();
                info!(stream_id = %id, attempt, restarts, "Restarted encoder");
                ctx.emit(StreamEvent::Started {
                    stream_id: id.clone(),
                    attempt,
                    pids: group.pids(),
                });
                current = Some(group);
            }
            Err(e) => {
                // Treated like an immediate exit; the loop policy decides what's next.
                warn!(stream_id = %id, attempt, error = %e, "Failed to restart encoder");
                handle.set_state(StreamState::Exited);
                ctx.emit(StreamEvent::StartFailed {
                    stream_id: id.clone(),
                    error: e.to_string(),
                });
            }
        }
    };

    ctx.retire_definition(&id, reason).await;
    info!(stream_id = %id, reason = %reason, restarts = handle.restarts(), "Stream stopped");
    drop(guard);
    ctx.emit(StreamEvent::Stopped {
        stream_id: id,
        reason,
    });
}
