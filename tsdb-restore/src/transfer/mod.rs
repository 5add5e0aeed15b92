//! Streaming of backup files to the server.

pub mod progress;
pub mod progress_stream;
pub mod shard;
