//! Engine configuration
//!
//! Process-wide knobs that stay fixed across sessions. Every field has a
//! default, so a partial JSON file is enough to override a single value.

use crate::capture::AudioFormat;
use crate::utils::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Audio mixing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioConfig {
    pub format: AudioFormat,
    /// Delay applied at the summation point in studio mode
    pub studio_delay_ms: u64,
    /// Length of one processing quantum
    pub quantum_ms: u64,
    /// Pending input older than this is dropped
    pub max_buffer_ms: u64,
    pub audio_bitrate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            studio_delay_ms: 100,
            quantum_ms: 10,
            max_buffer_ms: 200,
            audio_bitrate: 320_000,
        }
    }
}

/// Compositing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    pub webcam_diameter: f64,
    /// Initial webcam x, measured from the right edge of the surface
    pub webcam_right_offset: f64,
    pub webcam_top: f64,
    pub webcam_border_width: f64,
    pub brush_width: f64,
    pub default_brush_color: String,
    pub watermark_width: u32,
    pub watermark_margin: u32,
    pub watermark_opacity: f32,
    pub ripple_initial_radius: f64,
    pub ripple_radius_step: f64,
    pub ripple_alpha_step: f32,
    pub ripple_line_width: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            webcam_diameter: 200.0,
            webcam_right_offset: 300.0,
            webcam_top: 50.0,
            webcam_border_width: 4.0,
            brush_width: 5.0,
            default_brush_color: "#ef4444".to_string(),
            watermark_width: 150,
            watermark_margin: 20,
            watermark_opacity: 0.7,
            ripple_initial_radius: 10.0,
            ripple_radius_step: 2.5,
            ripple_alpha_step: 0.03,
            ripple_line_width: 3.0,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Encoder timeslice
    pub chunk_interval_ms: u64,
    /// Delay between countdown ticks
    pub countdown_tick_ms: u64,
    /// Directory backing the durable chunk log
    pub store_dir: PathBuf,
    /// Video bitrate used when re-encoding a trimmed range
    pub trim_video_bitrate: u32,
    pub audio: AudioConfig,
    pub render: RenderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 100,
            countdown_tick_ms: 1000,
            store_dir: std::env::temp_dir().join("studio-recorder").join("chunks"),
            trim_video_bitrate: 8_000_000,
            audio: AudioConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        tracing::debug!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default(path: &Path) -> EngineResult<Self> {
        if !path.exists() {
            tracing::debug!("No engine config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}
