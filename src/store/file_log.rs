//! Directory-backed chunk log
//!
//! Each chunk is one file named by a zero-padded sequence number, so a
//! directory listing sorted by name is the append order. Files are written
//! under a temporary name, synced, then renamed, so a crash never leaves a
//! half-written entry behind a valid name.
//!
//! File layout: the MIME type, a newline, then the raw payload.
//!
//! Appends and clears hold one write lock, so a clear never interleaves
//! with an append that has already reserved its sequence number.

use super::log::{Chunk, ChunkLog};
use crate::utils::error::{EngineError, EngineResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const CHUNK_PREFIX: &str = "chunk-";
const CHUNK_SUFFIX: &str = ".bin";

/// Durable chunk log stored in one directory
pub struct FileChunkLog {
    dir: PathBuf,
    next_seq: Mutex<Option<u64>>,
    writer: tokio::sync::Mutex<()>,
}

impl FileChunkLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_seq: Mutex::new(None),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn chunk_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}{:010}{}", CHUNK_PREFIX, seq, CHUNK_SUFFIX))
    }

    /// Sequence numbers of every committed chunk, sorted
    async fn sequences(&self) -> EngineResult<Vec<u64>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut seqs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(seq) = parse_sequence(&name.to_string_lossy()) {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    async fn reserve_sequence(&self) -> EngineResult<u64> {
        let known = *self.next_seq.lock();
        let next = match known {
            Some(next) => next,
            None => {
                self.open().await?;
                (*self.next_seq.lock()).unwrap_or(0)
            }
        };
        *self.next_seq.lock() = Some(next + 1);
        Ok(next)
    }
}

fn parse_sequence(name: &str) -> Option<u64> {
    name.strip_prefix(CHUNK_PREFIX)?
        .strip_suffix(CHUNK_SUFFIX)?
        .parse()
        .ok()
}

fn decode_entry(raw: Vec<u8>, path: &Path) -> EngineResult<Chunk> {
    let split = raw.iter().position(|&b| b == b'\n').ok_or_else(|| {
        EngineError::Persistence(format!("Chunk file {:?} has no MIME header", path))
    })?;
    let mime_type = String::from_utf8_lossy(&raw[..split]).into_owned();
    Ok(Chunk::new(raw[split + 1..].to_vec(), mime_type))
}

#[async_trait]
impl ChunkLog for FileChunkLog {
    async fn open(&self) -> EngineResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let next = self.sequences().await?.last().map(|s| s + 1).unwrap_or(0);
        *self.next_seq.lock() = Some(next);
        tracing::debug!("Opened chunk log at {:?} (next entry {})", self.dir, next);
        Ok(())
    }

    async fn append(&self, chunk: &Chunk) -> EngineResult<()> {
        let _writer = self.writer.lock().await;
        let seq = self.reserve_sequence().await?;
        let path = self.chunk_path(seq);
        let temp = path.with_extension("tmp");

        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(chunk.mime_type.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.write_all(&chunk.data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp, &path).await?;
        Ok(())
    }

    async fn count(&self) -> EngineResult<usize> {
        Ok(self.sequences().await?.len())
    }

    async fn get_all(&self) -> EngineResult<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for seq in self.sequences().await? {
            let path = self.chunk_path(seq);
            let raw = tokio::fs::read(&path).await?;
            chunks.push(decode_entry(raw, &path)?);
        }
        Ok(chunks)
    }

    async fn clear(&self) -> EngineResult<()> {
        let _writer = self.writer.lock().await;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                *self.next_seq.lock() = None;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(CHUNK_PREFIX) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        *self.next_seq.lock() = Some(0);
        tracing::debug!("Cleared chunk log at {:?} ({} entries)", self.dir, removed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_then_read_back_in_order() {
        let dir = tempdir().unwrap();
        let log = FileChunkLog::new(dir.path().join("chunks"));
        log.open().await.unwrap();

        for i in 0..12u8 {
            log.append(&Chunk::new(vec![i; 3], "video/webm")).await.unwrap();
        }

        assert_eq!(log.count().await.unwrap(), 12);
        let chunks = log.get_all().await.unwrap();
        let firsts: Vec<u8> = chunks.iter().map(|c| c.data[0]).collect();
        assert_eq!(firsts, (0..12).collect::<Vec<u8>>());
        assert_eq!(chunks[0].mime_type, "video/webm");
    }

    #[tokio::test]
    async fn test_log_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks");
        {
            let log = FileChunkLog::new(&path);
            log.append(&Chunk::new(vec![1], "video/mp4")).await.unwrap();
            log.append(&Chunk::new(vec![2], "video/mp4")).await.unwrap();
        }

        let reopened = FileChunkLog::new(&path);
        reopened.open().await.unwrap();
        reopened.append(&Chunk::new(vec![3], "video/mp4")).await.unwrap();
        let data: Vec<u8> = reopened
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|c| c.data[0])
            .collect();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent_and_tolerates_missing_dir() {
        let dir = tempdir().unwrap();
        let log = FileChunkLog::new(dir.path().join("never-created"));
        log.clear().await.unwrap();
        log.clear().await.unwrap();
        assert_eq!(log.count().await.unwrap(), 0);

        log.append(&Chunk::new(vec![9], "video/webm")).await.unwrap();
        log.clear().await.unwrap();
        assert_eq!(log.count().await.unwrap(), 0);
        assert!(log.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_never_leaves_entries_out_of_order() {
        let dir = tempdir().unwrap();
        let log = FileChunkLog::new(dir.path());
        for i in 0..5u8 {
            log.append(&Chunk::new(vec![i], "video/webm")).await.unwrap();
        }

        let late = Chunk::new(vec![9], "video/webm");
        let (appended, cleared) = tokio::join!(log.append(&late), log.clear());
        appended.unwrap();
        cleared.unwrap();
        log.append(&Chunk::new(vec![10], "video/webm")).await.unwrap();

        let data: Vec<u8> = log.get_all().await.unwrap().iter().map(|c| c.data[0]).collect();
        assert!(data == vec![9, 10] || data == vec![10], "unexpected log {:?}", data);
    }

    #[tokio::test]
    async fn test_payload_may_contain_newlines() {
        let dir = tempdir().unwrap();
        let log = FileChunkLog::new(dir.path());
        log.append(&Chunk::new(b"a\nb\n".to_vec(), "video/webm;codecs=vp9,opus"))
            .await
            .unwrap();
        let chunk = &log.get_all().await.unwrap()[0];
        assert_eq!(chunk.data.as_slice(), b"a\nb\n");
        assert_eq!(chunk.mime_type, "video/webm;codecs=vp9,opus");
    }
}
