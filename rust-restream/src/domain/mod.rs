//! Domain types for restreaming jobs.

pub mod source;
pub mod stream;

pub use source::StreamSource;
pub use stream::{StreamDefinition, StreamState, StreamStatus, generate_stream_id};
