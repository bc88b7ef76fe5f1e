//! Error types and handling
//!
//! Common error types used across the recording engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Unsupported encoder configuration: {0}")]
    EncodingUnsupported(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Trim unsupported: {0}")]
    TrimUnsupported(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid trim range: start={start}s end={end}s duration={duration}s")]
    InvalidTrimRange { start: f64, end: f64, duration: f64 },

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("No preview artifact available")]
    NoPreview,

    #[error("Engine busy: {0}")]
    Busy(String),
}

impl EngineError {
    /// Whether this error came from stream acquisition (permission or device)
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            EngineError::PermissionDenied(_) | EngineError::DeviceUnavailable(_)
        )
    }
}

/// Error response for the presentation layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<EngineError> for ErrorResponse {
    fn from(error: EngineError) -> Self {
        let code = match &error {
            EngineError::Io(_) => "IO_ERROR",
            EngineError::Serialization(_) => "SERIALIZATION_ERROR",
            EngineError::PermissionDenied(_) => "PERMISSION_DENIED",
            EngineError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            EngineError::EncodingUnsupported(_) => "ENCODING_UNSUPPORTED",
            EngineError::Encoding(_) => "ENCODING_ERROR",
            EngineError::TrimUnsupported(_) => "TRIM_UNSUPPORTED",
            EngineError::Persistence(_) => "PERSISTENCE_ERROR",
            EngineError::InvalidTrimRange { .. } => "INVALID_TRIM_RANGE",
            EngineError::Ffmpeg(_) => "FFMPEG_ERROR",
            EngineError::Image(_) => "IMAGE_ERROR",
            EngineError::NoPreview => "NO_PREVIEW",
            EngineError::Busy(_) => "BUSY",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using EngineError
pub type EngineResult<T> = Result<T, EngineError>;
