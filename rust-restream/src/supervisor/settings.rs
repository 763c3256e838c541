//! Supervisor tuning and stop policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to a stored definition when its stream stops.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StopPolicy {
    /// Stopping deletes the definition.
    #[default]
    Delete,
    /// Stopping keeps the definition with `enabled = false`.
    Retain,
}

/// Timing and policy knobs for supervising tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Pause between an exit and the next start of a looping stream.
    pub restart_cooldown: Duration,
    /// How long members get to exit after SIGTERM before being killed.
    pub stop_grace: Duration,
    pub stop_policy: StopPolicy,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            restart_cooldown: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
            stop_policy: StopPolicy::Delete,
        }
    }
}
