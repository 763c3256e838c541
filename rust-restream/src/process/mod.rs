//! Encoder processes.
//!
//! - [`EncoderConfig`] describes how ffmpeg is invoked
//! - [`StreamEngine`] turns a stream definition into a [`ProcessGroup`]
//! - [`ProcessGroup`] owns the spawned processes and their OS process groups

mod config;
mod engine;
mod group;

pub use config::{EncoderConfig, FanoutMode};
pub use engine::{FfmpegEngine, StreamEngine, TEE_LABEL};
pub use group::{MemberExit, ProcessGroup};
