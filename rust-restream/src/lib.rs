//! rust-restream library crate.
//!
//! Supervises ffmpeg restreaming jobs: each stored stream definition is
//! pushed from its source to its destinations by a group of encoder
//! processes, restarted on exit when the stream loops, and restored after
//! the service restarts.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod process;
pub mod store;
pub mod supervisor;
pub mod utils;

pub use error::{Error, Result};
