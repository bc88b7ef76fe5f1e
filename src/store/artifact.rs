//! Preview artifact assembled from chunks

use super::log::Chunk;
use crate::encoder::formats::{extension_for, DEFAULT_MIME_TYPE};
use crate::utils::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// A finished, playable recording
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewArtifact {
    pub data: Arc<Vec<u8>>,
    pub mime_type: String,
    /// Length in seconds
    pub duration: f64,
}

impl PreviewArtifact {
    /// Concatenate chunks in order. None for an empty recording.
    ///
    /// The duration is estimated from the chunk count and the emission
    /// interval until a player reports the real value.
    pub fn assemble(chunks: &[Chunk], chunk_interval: Duration) -> Option<Self> {
        if chunks.is_empty() {
            return None;
        }
        let mime_type = chunks
            .iter()
            .map(|c| c.mime_type.as_str())
            .find(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();

        let total: usize = chunks.iter().map(Chunk::len).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in chunks {
            data.extend_from_slice(&chunk.data);
        }

        Some(Self {
            data: Arc::new(data),
            mime_type,
            duration: chunks.len() as f64 * chunk_interval.as_secs_f64(),
        })
    }

    /// Same as `assemble` but never None; used for trim output where an
    /// empty range is still a result
    pub fn assemble_or_empty(chunks: &[Chunk], mime_type: &str, duration: f64) -> Self {
        let mut artifact = Self::assemble(chunks, Duration::ZERO).unwrap_or_else(|| Self {
            data: Arc::new(Vec::new()),
            mime_type: mime_type.to_string(),
            duration: 0.0,
        });
        artifact.duration = duration.max(0.0);
        artifact
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        if duration.is_finite() && duration >= 0.0 {
            self.duration = duration;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }

    /// Write the artifact into `dir` under its download name
    pub fn save(&self, dir: &Path, name: Option<&str>, trimmed: bool) -> EngineResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(download_name(name, &self.mime_type, trimmed));
        std::fs::write(&path, self.data.as_slice())?;
        tracing::info!("Saved recording to {:?} ({} bytes)", path, self.len());
        Ok(path)
    }
}

/// File name for a download: `<name>.<ext>` or `<name>_trimmed.<ext>`,
/// with `recording` standing in for a blank name
pub fn download_name(name: Option<&str>, mime_type: &str, trimmed: bool) -> String {
    let base = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("recording");
    let suffix = if trimmed { "_trimmed" } else { "" };
    format!("{}{}.{}", base, suffix, extension_for(mime_type))
}

/// Inclusive time range within an artifact, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

impl TrimRange {
    /// Check `0 <= start <= end <= duration`. Bounds that overshoot
    /// through rounding are clamped into range first.
    pub fn validated(start: f64, end: f64, duration: f64) -> EngineResult<Self> {
        let invalid = || EngineError::InvalidTrimRange {
            start,
            end,
            duration,
        };
        if !start.is_finite() || !end.is_finite() || !duration.is_finite() || duration < 0.0 {
            return Err(invalid());
        }

        let clamped_start = start.clamp(0.0, duration);
        let clamped_end = end.clamp(0.0, duration);
        if clamped_start > clamped_end {
            return Err(invalid());
        }
        Ok(Self {
            start: clamped_start,
            end: clamped_end,
        })
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }
}
