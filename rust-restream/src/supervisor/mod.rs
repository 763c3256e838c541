//! Stream supervision.
//!
//! [`StreamManager`] is the entry point. Each started stream gets a
//! [`StreamHandle`] in the [`Registry`] and one supervising task that owns
//! its process group until the stream reaches `Stopped`.

mod events;
mod manager;
mod registry;
mod settings;
mod task;

pub use events::{StopReason, StreamEvent};
pub use manager::StreamManager;
pub use registry::{Registry, StreamHandle};
pub use settings::{StopPolicy, SupervisorSettings};
