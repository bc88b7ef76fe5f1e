//! Encoder trait definitions
//!
//! An encoder consumes one live video source and at most one audio source
//! and emits container chunks at a fixed wall-clock interval. Control calls
//! are requests: the final `Stopped` event arrives on the event channel
//! after the last chunk.

use crate::capture::{AudioSource, VideoSource};
use crate::store::Chunk;
use crate::utils::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoderConfig {
    pub mime_type: String,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub chunk_interval_ms: u64,
    pub frame_rate: u32,
}

/// Events emitted by a running encoder
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    /// One timeslice of encoded output
    Chunk(Chunk),
    /// The encoder flushed its last chunk and released its inputs
    Stopped,
    /// The encoder died; no further chunks follow
    Failed(String),
}

/// Encoder lifecycle as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}

/// Live encoder handle
pub trait Encoder: Send + Sync {
    /// Begin encoding; chunks and the final stop go to `events`
    fn start(&self, events: mpsc::UnboundedSender<EncoderEvent>) -> EngineResult<()>;

    /// Stop consuming input without ending the output
    fn pause(&self) -> EngineResult<()>;

    fn resume(&self) -> EngineResult<()>;

    /// Request a flush and stop. Idempotent.
    fn stop(&self) -> EngineResult<()>;

    fn state(&self) -> EncoderState;
}

/// Creates encoders for a configuration
pub trait EncoderFactory: Send + Sync {
    /// Whether a MIME type can be produced at all
    fn is_supported(&self, mime_type: &str) -> bool;

    /// Build an encoder. Fails with `EncodingUnsupported` when the
    /// configuration cannot be honored.
    fn create(
        &self,
        config: EncoderConfig,
        video: Arc<dyn VideoSource>,
        audio: Option<Arc<dyn AudioSource>>,
    ) -> EngineResult<Box<dyn Encoder>>;
}
