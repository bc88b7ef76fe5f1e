//! Capture trait definitions
//!
//! Platform-agnostic stream handles and the provider that acquires them.
//! Concrete providers (browser bridge, ScreenCaptureKit, WASAPI, ...) live
//! outside the engine and only have to satisfy these traits.

use crate::utils::error::EngineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

/// A single decoded video frame in tightly packed RGBA8
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Create a frame filled with one RGBA color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..(width * height) {
            data.extend_from_slice(&rgba);
        }
        Self { width, height, data }
    }

    /// Read one pixel, None when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        self.data
            .get(idx..idx + 4)
            .map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Whether the buffer length matches width x height x 4
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// PCM format shared by every audio stream entering the mix graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

impl AudioFormat {
    /// Number of frames covering `ms` milliseconds
    pub fn frames_for_ms(&self, ms: u64) -> usize {
        (self.sample_rate as u64 * ms / 1000) as usize
    }
}

/// Interleaved f32 PCM block
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
    pub format: AudioFormat,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, format: AudioFormat) -> Self {
        Self { samples, format }
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.format.channels == 0 {
            return 0;
        }
        self.samples.len() / self.format.channels as usize
    }

    /// Root-mean-square level of the block
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f32).sqrt()
    }
}

/// A live video stream handle
///
/// Behaves like a playing video element: the latest frame can be sampled at
/// any time by any number of consumers.
pub trait VideoSource: Send + Sync {
    /// Stream label used in logs
    fn label(&self) -> &str;

    /// Native dimensions of the stream
    fn dimensions(&self) -> Resolution;

    /// Whether a frame is available for drawing
    fn is_ready(&self) -> bool;

    /// The most recent frame, if any
    fn latest_frame(&self) -> Option<Arc<VideoFrame>>;

    /// Whether the stream ended on its own (e.g. the user stopped sharing)
    fn is_ended(&self) -> bool {
        false
    }

    /// Stop the underlying device track. Must be idempotent.
    fn stop(&self);
}

/// A live audio stream handle
pub trait AudioSource: Send + Sync {
    /// Stream label used in logs
    fn label(&self) -> &str;

    /// Pop the next pending block, None when nothing is buffered right now
    fn read(&self) -> Option<AudioBlock>;

    /// Stop the underlying device track. Must be idempotent.
    fn stop(&self);
}

/// Screen capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRequest {
    pub resolution: Resolution,
    pub frame_rate: u32,
    pub hide_cursor: bool,
}

/// Streams returned by a screen acquisition
pub struct ScreenCapture {
    pub video: Arc<dyn VideoSource>,
    /// System audio shared alongside the screen, when the host offers it
    pub audio: Option<Arc<dyn AudioSource>>,
}

/// Host capture provider
///
/// Every call may wait indefinitely on a user permission prompt and may fail
/// with `PermissionDenied` or `DeviceUnavailable`.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn acquire_screen(&self, request: ScreenRequest) -> EngineResult<ScreenCapture>;

    async fn acquire_microphone(&self) -> EngineResult<Arc<dyn AudioSource>>;

    async fn acquire_webcam(&self) -> EngineResult<Arc<dyn VideoSource>>;
}
