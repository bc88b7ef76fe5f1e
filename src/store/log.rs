//! Chunk and durable log definitions

use crate::utils::error::EngineResult;
use async_trait::async_trait;
use std::sync::Arc;

/// One encoded slice of the recording, in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Arc<Vec<u8>>,
    pub mime_type: String,
}

impl Chunk {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data: Arc::new(data),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Append-only durable log of chunks bound to one fixed logical store
///
/// The log must survive process restart. Entries come back from `get_all`
/// in append order.
#[async_trait]
pub trait ChunkLog: Send + Sync {
    /// Prepare the backing store. Safe to call repeatedly.
    async fn open(&self) -> EngineResult<()>;

    async fn append(&self, chunk: &Chunk) -> EngineResult<()>;

    async fn count(&self) -> EngineResult<usize>;

    async fn get_all(&self) -> EngineResult<Vec<Chunk>>;

    /// Remove every entry. Must be idempotent.
    async fn clear(&self) -> EngineResult<()>;
}
