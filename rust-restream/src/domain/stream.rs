//! Stream definition and runtime state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::source::StreamSource;
use crate::{Error, Result};

fn default_enabled() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// A persisted restreaming job: one source pushed to one or more destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDefinition {
    /// Opaque unique id, generated at creation.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Local file path or URL.
    pub source: String,
    /// Output endpoints, in order.
    pub destinations: Vec<String>,
    /// Restart the encoder every time it exits.
    #[serde(rename = "loop", default)]
    pub looping: bool,
    /// Whether recovery should start this stream.
    ///
    /// Only ever `false` when stopped streams are retained instead of deleted.
    #[serde(default = "default_enabled", skip_serializing_if = "is_true")]
    pub enabled: bool,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl StreamDefinition {
    /// Create a definition with a freshly generated id.
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        destinations: Vec<String>,
        looping: bool,
    ) -> Self {
        Self {
            id: generate_stream_id(),
            name: name.into(),
            source: source.into(),
            destinations,
            looping,
            enabled: true,
            created_at: Some(Utc::now()),
        }
    }

    /// Set the id (used by imports and tests).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Check the definition before anything is persisted or spawned.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("Stream id cannot be empty"));
        }
        if self.source.trim().is_empty() {
            return Err(Error::validation("Source not specified"));
        }
        if self.destinations.is_empty() {
            return Err(Error::validation("At least one destination is required"));
        }
        if let Some(pos) = self.destinations.iter().position(|d| d.trim().is_empty()) {
            return Err(Error::validation(format!("Destination #{} is empty", pos + 1)));
        }
        Ok(())
    }

    /// Classify the source.
    pub fn parsed_source(&self) -> Result<StreamSource> {
        StreamSource::parse(&self.source)
    }

    /// Name shown to users; falls back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Generate a new stream id.
pub fn generate_stream_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Lifecycle state of a supervised stream.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamState {
    Idle,
    Starting,
    Running,
    Exited,
    Restarting,
    Stopped,
}

impl StreamState {
    /// States in which the stream holds (or is about to hold) processes.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Restarting)
    }
}

/// A stored definition together with its derived runtime status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatus {
    #[serde(flatten)]
    pub definition: StreamDefinition,
    /// True while a supervising task is registered for the id.
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StreamState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pids: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub restarts: u32,
}
