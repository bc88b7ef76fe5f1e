//! Chunk storage
//!
//! Ordered chunk buffer, the durable log behind it, and the preview artifact
//! assembled from either.

pub mod artifact;
pub mod chunk_store;
pub mod file_log;
pub mod log;

pub use artifact::{download_name, PreviewArtifact, TrimRange};
pub use chunk_store::ChunkStore;
pub use file_log::FileChunkLog;
pub use log::{Chunk, ChunkLog};
