//! Recording state management
//!
//! Defines the recording state machine, the session snapshot exposed to the
//! presentation layer, and the per-start recorder settings.

use crate::capture::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// No recording in progress
    #[default]
    Idle,
    /// Acquiring streams, or finalizing/trimming an artifact
    Processing,
    /// Counting down before the encoder starts
    Countdown,
    /// Currently recording
    Recording,
    /// Recording is paused
    Paused,
    /// The last start or recording failed; a new start is allowed
    Error,
}

impl RecordingStatus {
    /// Whether a start request is accepted in this state
    pub fn accepts_start(&self) -> bool {
        matches!(self, RecordingStatus::Idle | RecordingStatus::Error)
    }

    /// Whether the encoder is live in this state
    pub fn is_capturing(&self) -> bool {
        matches!(self, RecordingStatus::Recording | RecordingStatus::Paused)
    }
}

/// Canonical session status exposed to the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    /// Session identifier, None while idle
    pub id: Option<Uuid>,

    pub status: RecordingStatus,

    /// Seconds spent in `Recording` (paused time excluded)
    pub elapsed_seconds: u64,

    /// Remaining countdown ticks, 0 outside of `Countdown`
    pub countdown_value: u32,

    pub error_message: Option<String>,

    /// Wall-clock time the session was created
    pub started_at: Option<DateTime<Utc>>,
}

impl RecordingSession {
    /// Fresh session entering `Processing`
    pub fn begin() -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            status: RecordingStatus::Processing,
            elapsed_seconds: 0,
            countdown_value: 0,
            error_message: None,
            started_at: Some(Utc::now()),
        }
    }

    /// Reset to idle, keeping nothing from the previous session
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Move to `Error` with a user-visible message
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = RecordingStatus::Error;
        self.countdown_value = 0;
        self.error_message = Some(message.into());
    }
}

/// Capture quality presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VideoQuality {
    #[serde(rename = "720p")]
    Hd720,
    #[default]
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl VideoQuality {
    /// Requested capture resolution
    pub fn resolution(&self) -> Resolution {
        match self {
            VideoQuality::Hd720 => Resolution::new(1280, 720),
            VideoQuality::Hd1080 => Resolution::new(1920, 1080),
            VideoQuality::Uhd4k => Resolution::new(3840, 2160),
        }
    }

    /// Default encoder video bitrate in bits per second
    pub fn video_bitrate(&self) -> u32 {
        match self {
            VideoQuality::Hd720 => 5_000_000,
            VideoQuality::Hd1080 => 8_000_000,
            VideoQuality::Uhd4k => 15_000_000,
        }
    }
}

/// Whether the encoder records the raw screen or the composited surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    /// Raw screen stream, no compositing latency
    Native,
    /// Composited surface with webcam, annotations and watermark
    #[default]
    Studio,
}

/// Settings for starting a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderSettings {
    pub quality: VideoQuality,

    /// Capture frame rate (30 or 60)
    pub frame_rate: u32,

    /// Whether to capture the microphone
    pub enable_audio: bool,

    pub hide_cursor: bool,

    /// Container/codec requested from the encoder
    pub mime_type: String,

    /// Countdown length in ticks
    pub countdown_duration: u32,

    /// Video bitrate override in bits per second, 0 uses the quality preset
    pub bitrate: u32,

    pub recording_mode: RecordingMode,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            quality: VideoQuality::default(),
            frame_rate: 30,
            enable_audio: true,
            hide_cursor: false,
            mime_type: "video/webm;codecs=vp9,opus".to_string(),
            countdown_duration: 3,
            bitrate: 0,
            recording_mode: RecordingMode::default(),
        }
    }
}

impl RecorderSettings {
    /// Effective video bitrate
    pub fn video_bitrate(&self) -> u32 {
        if self.bitrate > 0 {
            self.bitrate
        } else {
            self.quality.video_bitrate()
        }
    }

    /// Whether the composited surface is what gets encoded
    pub fn is_studio(&self) -> bool {
        self.recording_mode == RecordingMode::Studio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_accepted_only_from_idle_or_error() {
        assert!(RecordingStatus::Idle.accepts_start());
        assert!(RecordingStatus::Error.accepts_start());
        assert!(!RecordingStatus::Recording.accepts_start());
        assert!(!RecordingStatus::Countdown.accepts_start());
        assert!(!RecordingStatus::Processing.accepts_start());
    }

    #[test]
    fn test_settings_parse_camel_case_with_defaults() {
        let json = r#"{"quality":"720p","frameRate":30,"recordingMode":"native"}"#;
        let settings: RecorderSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.quality, VideoQuality::Hd720);
        assert_eq!(settings.recording_mode, RecordingMode::Native);
        assert_eq!(settings.countdown_duration, 3);
        assert_eq!(settings.video_bitrate(), 5_000_000);
        assert_eq!(settings.quality.resolution(), Resolution::new(1280, 720));
    }

    #[test]
    fn test_session_fail_sets_message() {
        let mut session = RecordingSession::begin();
        session.fail("Permission denied");
        assert_eq!(session.status, RecordingStatus::Error);
        assert_eq!(session.error_message.as_deref(), Some("Permission denied"));
        session.reset();
        assert_eq!(session.status, RecordingStatus::Idle);
        assert!(session.id.is_none());
    }
}
