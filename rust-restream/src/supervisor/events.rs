//! Lifecycle events emitted by supervising tasks.

use serde::{Deserialize, Serialize};

use crate::process::MemberExit;

/// Why a stream reached `Stopped`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// The encoder exited and the stream does not loop.
    Completed,
    /// Someone asked for the stream to stop.
    Requested,
    /// The definition disappeared from the store.
    Removed,
    /// The stream could not be started.
    Failed,
    /// The supervisor is shutting down; the definition is kept for recovery.
    Shutdown,
    /// A snapshot import is replacing every definition.
    Replaced,
}

impl StopReason {
    /// Whether the stored definition is left untouched on stop.
    pub fn keeps_definition(&self) -> bool {
        matches!(self, Self::Shutdown | Self::Replaced)
    }
}

/// Events broadcast by the stream manager.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A process group was spawned. `attempt` starts at 1.
    Started {
        stream_id: String,
        attempt: u32,
        pids: Vec<u32>,
    },
    /// Every member of the group exited.
    Exited {
        stream_id: String,
        exits: Vec<MemberExit>,
    },
    /// A looping stream is cooling down before its next attempt.
    Restarting {
        stream_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    /// A start attempt failed before any process ran.
    StartFailed { stream_id: String, error: String },
    Stopped {
        stream_id: String,
        reason: StopReason,
    },
}

impl StreamEvent {
    pub fn stream_id(&self) -> &str {
        match self {
            Self::Started { stream_id, .. }
            | Self::Exited { stream_id, .. }
            | Self::Restarting { stream_id, .. }
            | Self::StartFailed { stream_id, .. }
            | Self::Stopped { stream_id, .. } => stream_id,
        }
    }
}
