//! Container format negotiation

use super::traits::EncoderFactory;
use serde::{Deserialize, Serialize};

/// A selectable output format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatOption {
    pub label: String,
    pub mime_type: String,
}

/// Candidate formats, most preferred first
pub const FORMAT_CANDIDATES: &[(&str, &str)] = &[
    ("MP4 (H.264)", "video/mp4;codecs=avc1.42E01E,mp4a.40.2"),
    ("MP4", "video/mp4"),
    ("WebM (VP9)", "video/webm;codecs=vp9,opus"),
    ("WebM (VP8)", "video/webm;codecs=vp8,opus"),
    ("WebM", "video/webm"),
];

/// MIME type used when none is configured
pub const DEFAULT_MIME_TYPE: &str = "video/webm;codecs=vp9,opus";

/// Container family of a MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Webm,
}

impl Container {
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.trim().to_ascii_lowercase().starts_with("video/mp4") {
            Container::Mp4
        } else {
            Container::Webm
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
        }
    }
}

/// File extension for a MIME type (`mp4` or `webm`)
pub fn extension_for(mime_type: &str) -> &'static str {
    Container::from_mime(mime_type).extension()
}

/// Codec list of a MIME type, e.g. `["vp9", "opus"]`
pub fn codecs_of(mime_type: &str) -> Vec<String> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("codecs="))
        .flat_map(|list| list.trim_matches('"').split(','))
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Formats the factory can produce, in preference order, one per label
pub fn supported_formats(factory: &dyn EncoderFactory) -> Vec<FormatOption> {
    let mut formats: Vec<FormatOption> = Vec::new();
    for (label, mime_type) in FORMAT_CANDIDATES {
        if !factory.is_supported(mime_type) {
            continue;
        }
        if formats.iter().any(|f| f.label == *label) {
            continue;
        }
        formats.push(FormatOption {
            label: label.to_string(),
            mime_type: mime_type.to_string(),
        });
    }
    formats
}
