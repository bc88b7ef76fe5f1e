//! In-memory chunk buffer mirrored into the durable log
//!
//! Persistence is best-effort: a log that fails to open, append or clear is
//! logged and the recording carries on from the in-memory buffer alone.

use super::log::{Chunk, ChunkLog};
use crate::utils::error::EngineResult;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct ChunkStore {
    log: Arc<dyn ChunkLog>,
    buffer: Mutex<Vec<Chunk>>,
    durable: AtomicBool,
}

impl ChunkStore {
    pub fn new(log: Arc<dyn ChunkLog>) -> Self {
        Self {
            log,
            buffer: Mutex::new(Vec::new()),
            durable: AtomicBool::new(false),
        }
    }

    /// Empty the buffer, wipe any previous log and open it for appends
    pub async fn begin_session(&self) {
        self.buffer.lock().clear();
        self.clear_log().await;
        match self.log.open().await {
            Ok(()) => self.durable.store(true, Ordering::Relaxed),
            Err(e) => {
                self.durable.store(false, Ordering::Relaxed);
                tracing::warn!("Chunk log unavailable, recording without durability: {}", e);
            }
        }
    }

    /// Record one chunk: buffer first, then the durable log
    pub async fn append(&self, chunk: Chunk) {
        if chunk.is_empty() {
            return;
        }
        self.buffer.lock().push(chunk.clone());

        if !self.durable.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = self.log.append(&chunk).await {
            self.durable.store(false, Ordering::Relaxed);
            tracing::warn!("Failed to persist chunk, continuing in memory only: {}", e);
        }
    }

    pub fn is_durable(&self) -> bool {
        self.durable.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Copy of the buffered chunks in emission order
    pub fn chunks(&self) -> Vec<Chunk> {
        self.buffer.lock().clone()
    }

    /// Drain the buffer
    pub fn take_chunks(&self) -> Vec<Chunk> {
        std::mem::take(&mut *self.buffer.lock())
    }

    /// Wipe the durable log. Best-effort and idempotent.
    pub async fn clear_log(&self) {
        if let Err(e) = self.log.clear().await {
            tracing::warn!("Failed to clear chunk log: {}", e);
        }
    }

    /// Whether a previous run left chunks behind
    pub async fn has_recovery(&self) -> bool {
        match self.log.count().await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!("Found {} chunks from a previous recording", count);
                }
                count > 0
            }
            Err(e) => {
                tracing::warn!("Could not inspect chunk log: {}", e);
                false
            }
        }
    }

    /// Read the durable log back in append order
    pub async fn recover(&self) -> EngineResult<Vec<Chunk>> {
        let chunks = self.log.get_all().await?;
        tracing::info!("Recovered {} chunks", chunks.len());
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file_log::FileChunkLog;
    use crate::utils::error::EngineError;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct BrokenLog;

    #[async_trait]
    impl ChunkLog for BrokenLog {
        async fn open(&self) -> EngineResult<()> {
            Err(EngineError::Persistence("quota exceeded".into()))
        }

        async fn append(&self, _chunk: &Chunk) -> EngineResult<()> {
            Err(EngineError::Persistence("quota exceeded".into()))
        }

        async fn count(&self) -> EngineResult<usize> {
            Err(EngineError::Persistence("quota exceeded".into()))
        }

        async fn get_all(&self) -> EngineResult<Vec<Chunk>> {
            Err(EngineError::Persistence("quota exceeded".into()))
        }

        async fn clear(&self) -> EngineResult<()> {
            Err(EngineError::Persistence("quota exceeded".into()))
        }
    }

    #[tokio::test]
    async fn test_log_replay_matches_buffer() {
        let dir = tempdir().unwrap();
        let store = ChunkStore::new(Arc::new(FileChunkLog::new(dir.path())));
        store.begin_session().await;
        assert!(store.is_durable());

        for i in 0..5u8 {
            store.append(Chunk::new(vec![i, i + 1], "video/webm")).await;
        }

        let buffered: Vec<u8> = store.chunks().iter().flat_map(|c| c.data.to_vec()).collect();
        let replayed: Vec<u8> = store
            .recover()
            .await
            .unwrap()
            .iter()
            .flat_map(|c| c.data.to_vec())
            .collect();
        assert_eq!(buffered, replayed);
        assert!(store.has_recovery().await);
    }

    #[tokio::test]
    async fn test_begin_session_clears_previous_log() {
        let dir = tempdir().unwrap();
        let log = Arc::new(FileChunkLog::new(dir.path()));
        log.append(&Chunk::new(vec![1], "video/webm")).await.unwrap();

        let store = ChunkStore::new(log);
        assert!(store.has_recovery().await);
        store.begin_session().await;
        assert!(!store.has_recovery().await);
    }

    #[tokio::test]
    async fn test_broken_log_keeps_recording_in_memory() {
        let store = ChunkStore::new(Arc::new(BrokenLog));
        store.begin_session().await;
        assert!(!store.is_durable());

        store.append(Chunk::new(vec![1, 2, 3], "video/webm")).await;
        assert_eq!(store.len(), 1);
        assert!(!store.has_recovery().await);
        store.clear_log().await;
        assert_eq!(store.take_chunks().len(), 1);
        assert!(store.is_empty());
    }
}
