//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::StreamDefinition;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Body of `POST /api/streams`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStreamRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destinations: Vec<String>,
    #[serde(rename = "loop", default)]
    pub looping: bool,
    /// Persist without starting.
    #[serde(default = "default_start")]
    pub start: bool,
}

fn default_start() -> bool {
    true
}

impl CreateStreamRequest {
    pub fn into_definition(self) -> StreamDefinition {
        StreamDefinition::new(self.name, self.source, self.destinations, self.looping)
    }
}

/// Result of a stop request.
#[derive(Debug, Serialize)]
pub struct StopStreamResponse {
    pub id: String,
    /// Whether a running stream was stopped.
    pub stopped: bool,
}

/// Full store snapshot used for backup and restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub streams: Vec<StreamDefinition>,
}

impl StreamSnapshot {
    pub fn new(streams: Vec<StreamDefinition>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            exported_at: Utc::now(),
            streams,
        }
    }
}

/// Import accepts a full snapshot or a bare list of definitions.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ImportRequest {
    Snapshot(StreamSnapshot),
    Streams(Vec<StreamDefinition>),
}

impl ImportRequest {
    pub fn into_streams(self) -> Vec<StreamDefinition> {
        match self {
            Self::Snapshot(snapshot) => snapshot.streams,
            Self::Streams(streams) => streams,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub imported: usize,
    pub started: usize,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub encoder: EncoderHealth,
    pub running_streams: usize,
}

#[derive(Debug, Serialize)]
pub struct EncoderHealth {
    pub name: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Log filter read/update body.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogFilterBody {
    pub filter: String,
}

#[derive(Debug, Serialize)]
pub struct LogFilterResponse {
    pub filter: String,
    pub modules: Vec<LogModuleInfo>,
}

#[derive(Debug, Serialize)]
pub struct LogModuleInfo {
    pub name: String,
    pub description: String,
}
