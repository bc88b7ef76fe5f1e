//! Command-line construction for the live encoder

use crate::capture::{AudioFormat, Resolution};
use crate::encoder::formats::{codecs_of, Container};
use crate::utils::error::{EngineError, EngineResult};

/// Codec pair an ffmpeg process will use for one MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPlan {
    pub container: Container,
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
}

/// Map a MIME type to ffmpeg encoders, rejecting codecs we cannot produce
pub fn plan_codecs(mime_type: &str) -> EngineResult<CodecPlan> {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let container = match essence.as_str() {
        "video/mp4" => Container::Mp4,
        "video/webm" => Container::Webm,
        other => {
            return Err(EngineError::EncodingUnsupported(format!(
                "container {:?} is not supported",
                other
            )))
        }
    };

    let (mut video_codec, mut audio_codec) = match container {
        Container::Mp4 => ("libx264", "aac"),
        Container::Webm => ("libvpx-vp9", "libopus"),
    };

    for codec in codecs_of(mime_type) {
        match (container, codec.as_str()) {
            (Container::Mp4, c) if c.starts_with("avc1") || c == "h264" => video_codec = "libx264",
            (Container::Mp4, c) if c.starts_with("mp4a") || c == "aac" => audio_codec = "aac",
            (Container::Webm, "vp9") | (Container::Webm, "vp09") => video_codec = "libvpx-vp9",
            (Container::Webm, "vp8") => video_codec = "libvpx",
            (Container::Webm, "opus") => audio_codec = "libopus",
            (Container::Webm, "vorbis") => audio_codec = "libvorbis",
            (_, other) => {
                return Err(EngineError::EncodingUnsupported(format!(
                    "codec {:?} in {:?}",
                    other, mime_type
                )))
            }
        }
    }

    Ok(CodecPlan {
        container,
        video_codec,
        audio_codec,
    })
}

/// Inputs of one live encode
#[derive(Debug, Clone)]
pub struct LiveEncodeArgs {
    pub size: Resolution,
    pub frame_rate: u32,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub chunk_interval_ms: u64,
    /// Loopback port feeding raw audio, None for a silent recording
    pub audio_port: Option<u16>,
    pub audio_format: AudioFormat,
}

/// Full argument list: raw RGBA on stdin, f32le over TCP, fragmented
/// container on stdout
pub fn live_encode_args(plan: &CodecPlan, input: &LiveEncodeArgs) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        "rgba".to_string(),
        "-s".to_string(),
        format!("{}x{}", input.size.width, input.size.height),
        "-r".to_string(),
        input.frame_rate.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
    ];

    if let Some(port) = input.audio_port {
        args.extend([
            "-f".to_string(),
            "f32le".to_string(),
            "-ar".to_string(),
            input.audio_format.sample_rate.to_string(),
            "-ac".to_string(),
            input.audio_format.channels.to_string(),
            "-i".to_string(),
            format!("tcp://127.0.0.1:{}", port),
        ]);
    }

    args.extend([
        "-map".to_string(),
        "0:v".to_string(),
        "-c:v".to_string(),
        plan.video_codec.to_string(),
        "-b:v".to_string(),
        input.video_bitrate.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);

    match plan.video_codec {
        "libx264" => args.extend([
            "-preset".to_string(),
            "veryfast".to_string(),
            "-tune".to_string(),
            "zerolatency".to_string(),
        ]),
        _ => args.extend([
            "-deadline".to_string(),
            "realtime".to_string(),
            "-cpu-used".to_string(),
            "8".to_string(),
        ]),
    }

    // Keyframe per timeslice so every fragment boundary is cuttable
    let gop = (input.frame_rate as u64 * input.chunk_interval_ms / 1000).max(1);
    args.extend(["-g".to_string(), gop.to_string()]);

    if input.audio_port.is_some() {
        args.extend([
            "-map".to_string(),
            "1:a".to_string(),
            "-c:a".to_string(),
            plan.audio_codec.to_string(),
            "-b:a".to_string(),
            input.audio_bitrate.to_string(),
        ]);
    }

    match plan.container {
        Container::Mp4 => args.extend([
            "-movflags".to_string(),
            "frag_keyframe+empty_moov+default_base_moof".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
        ]),
        Container::Webm => args.extend([
            "-cluster_time_limit".to_string(),
            input.chunk_interval_ms.to_string(),
            "-f".to_string(),
            "webm".to_string(),
        ]),
    }

    args.push("pipe:1".to_string());
    args
}
