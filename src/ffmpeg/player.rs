//! Real-time playback of an artifact through ffmpeg
//!
//! The artifact is written to a temp file and decoded at native speed
//! (`-re`) by one process for RGBA video and one for f32le audio. Decoded
//! output is exposed as live sources so a fresh encoder can record it.

use super::probe::{probe_media, tool_available, MediaInfo};
use crate::audio::MixedTrack;
use crate::capture::{AudioBlock, AudioFormat, AudioSource, Resolution, VideoFrame, VideoSource};
use crate::store::PreviewArtifact;
use crate::trim::{PlaybackStream, Player, PlayerFactory};
use crate::utils::error::{EngineError, EngineResult};
use parking_lot::{Mutex, RwLock};
use std::io::{Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::NamedTempFile;

/// Decoded audio kept ahead of the encoder
const AUDIO_QUEUE_BLOCKS: usize = 50;

/// Audio block length in milliseconds
const AUDIO_BLOCK_MS: u64 = 10;

/// Loads artifacts into ffmpeg players
pub struct FfmpegPlayerFactory {
    ffmpeg: String,
    ffprobe: String,
    available: bool,
    audio_format: AudioFormat,
}

impl FfmpegPlayerFactory {
    pub fn new(audio_format: AudioFormat) -> Self {
        Self::with_binaries("ffmpeg", "ffprobe", audio_format)
    }

    pub fn with_binaries(
        ffmpeg: impl Into<String>,
        ffprobe: impl Into<String>,
        audio_format: AudioFormat,
    ) -> Self {
        let ffmpeg = ffmpeg.into();
        let ffprobe = ffprobe.into();
        let available = tool_available(&ffmpeg) && tool_available(&ffprobe);
        Self {
            ffmpeg,
            ffprobe,
            available,
            audio_format,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Write the artifact where ffmpeg can read it
    fn stage(&self, artifact: &PreviewArtifact) -> EngineResult<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("studio-recorder-")
            .suffix(&format!(".{}", artifact.extension()))
            .tempfile()?;
        file.write_all(&artifact.data)?;
        file.flush()?;
        Ok(file)
    }
}

impl PlayerFactory for FfmpegPlayerFactory {
    fn load(&self, artifact: &PreviewArtifact) -> EngineResult<Box<dyn Player>> {
        if !self.available {
            return Err(EngineError::TrimUnsupported(format!(
                "{} and {} are required for playback capture",
                self.ffmpeg, self.ffprobe
            )));
        }

        let file = self.stage(artifact)?;
        let info = probe_media(&self.ffprobe, file.path())?;
        let duration = info.duration.unwrap_or(artifact.duration);
        tracing::info!(
            "Loaded artifact for playback: {}x{} @ {:.2} fps, {:.2}s",
            info.width,
            info.height,
            info.fps,
            duration
        );

        Ok(Box::new(FfmpegPlayer::new(
            self.ffmpeg.clone(),
            file,
            info,
            duration,
            self.audio_format,
        )))
    }

    fn probe_duration(&self, artifact: &PreviewArtifact) -> Option<f64> {
        if !self.available {
            return None;
        }
        let file = self.stage(artifact).ok()?;
        match probe_media(&self.ffprobe, file.path()) {
            Ok(info) => info.duration.filter(|d| d.is_finite() && *d > 0.0),
            Err(e) => {
                tracing::warn!("Could not probe recording duration: {}", e);
                None
            }
        }
    }
}

/// Latest decoded frame of a playing file
struct PlaybackVideo {
    size: Resolution,
    frame: RwLock<Option<Arc<VideoFrame>>>,
    ended: AtomicBool,
}

impl VideoSource for PlaybackVideo {
    fn label(&self) -> &str {
        "playback-video"
    }

    fn dimensions(&self) -> Resolution {
        self.size
    }

    fn is_ready(&self) -> bool {
        self.frame.read().is_some()
    }

    fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.frame.read().clone()
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Relaxed)
    }

    fn stop(&self) {
        self.ended.store(true, Ordering::Relaxed);
    }
}

/// One artifact loaded for playback
pub struct FfmpegPlayer {
    ffmpeg: String,
    file: NamedTempFile,
    info: MediaInfo,
    duration: f64,
    audio_format: AudioFormat,
    start: Mutex<f64>,
    frames_played: Arc<AtomicU64>,
    video: Arc<PlaybackVideo>,
    audio: Option<Arc<MixedTrack>>,
    processes: Mutex<Vec<Child>>,
}

impl FfmpegPlayer {
    fn new(
        ffmpeg: String,
        file: NamedTempFile,
        info: MediaInfo,
        duration: f64,
        audio_format: AudioFormat,
    ) -> Self {
        let video = Arc::new(PlaybackVideo {
            size: Resolution::new(info.width, info.height),
            frame: RwLock::new(None),
            ended: AtomicBool::new(false),
        });
        let audio = info
            .has_audio
            .then(|| MixedTrack::new(AUDIO_QUEUE_BLOCKS));
        Self {
            ffmpeg,
            file,
            info,
            duration,
            audio_format,
            start: Mutex::new(0.0),
            frames_played: Arc::new(AtomicU64::new(0)),
            video,
            audio,
            processes: Mutex::new(Vec::new()),
        }
    }

    fn spawn_decoder(&self, start: f64, output: &[&str]) -> EngineResult<Child> {
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-hide_banner", "-loglevel", "error", "-ss"])
            .arg(format!("{:.3}", start))
            .arg("-re")
            .arg("-i")
            .arg(self.file.path())
            .args(output)
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        command
            .spawn()
            .map_err(|e| EngineError::Ffmpeg(format!("Failed to start FFmpeg decoder: {}", e)))
    }

    fn kill_all(&self) {
        for mut child in self.processes.lock().drain(..) {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Player for FfmpegPlayer {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn capture_stream(&self) -> Option<PlaybackStream> {
        Some(PlaybackStream {
            video: Arc::clone(&self.video) as Arc<dyn VideoSource>,
            audio: self
                .audio
                .as_ref()
                .map(|a| Arc::clone(a) as Arc<dyn AudioSource>),
        })
    }

    fn seek(&self, seconds: f64) -> EngineResult<()> {
        *self.start.lock() = seconds.clamp(0.0, self.duration.max(0.0));
        self.frames_played.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn play(&self) -> EngineResult<()> {
        self.kill_all();
        let start = *self.start.lock();
        let size = self.video.size;

        let scale = format!("{}x{}", size.width, size.height);
        let mut video_child = self.spawn_decoder(
            start,
            &["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "-s", scale.as_str()],
        )?;
        let stdout = video_child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Ffmpeg("Failed to capture FFmpeg stdout".to_string()))?;
        let video = Arc::clone(&self.video);
        let frames = Arc::clone(&self.frames_played);
        thread::spawn(move || pump_video(stdout, video, frames));
        self.processes.lock().push(video_child);

        if let Some(track) = &self.audio {
            let rate = self.audio_format.sample_rate.to_string();
            let channels = self.audio_format.channels.to_string();
            let mut audio_child = self.spawn_decoder(
                start,
                &["-vn", "-f", "f32le", "-ar", rate.as_str(), "-ac", channels.as_str()],
            )?;
            let stdout = audio_child
                .stdout
                .take()
                .ok_or_else(|| EngineError::Ffmpeg("Failed to capture FFmpeg stdout".to_string()))?;
            let track = Arc::clone(track);
            let format = self.audio_format;
            thread::spawn(move || pump_audio(stdout, track, format));
            self.processes.lock().push(audio_child);
        }

        tracing::debug!("Playback started at {:.2}s", start);
        Ok(())
    }

    fn pause(&self) {
        self.kill_all();
    }

    fn current_time(&self) -> f64 {
        let played = self.frames_played.load(Ordering::Relaxed) as f64 / self.info.fps;
        *self.start.lock() + played
    }

    fn is_ended(&self) -> bool {
        self.video.is_ended()
    }
}

impl Drop for FfmpegPlayer {
    fn drop(&mut self) {
        self.kill_all();
    }
}

fn pump_video(mut stdout: ChildStdout, video: Arc<PlaybackVideo>, frames: Arc<AtomicU64>) {
    let size = video.size;
    let frame_size = size.width as usize * size.height as usize * 4;
    loop {
        let mut data = vec![0u8; frame_size];
        match stdout.read_exact(&mut data) {
            Ok(()) => {
                *video.frame.write() = Some(Arc::new(VideoFrame {
                    width: size.width,
                    height: size.height,
                    data,
                }));
                frames.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => break,
        }
    }
    video.ended.store(true, Ordering::Relaxed);
}

fn pump_audio(mut stdout: ChildStdout, track: Arc<MixedTrack>, format: AudioFormat) {
    let samples = format.frames_for_ms(AUDIO_BLOCK_MS) * format.channels as usize;
    let mut bytes = vec![0u8; samples * 4];
    while stdout.read_exact(&mut bytes).is_ok() {
        let block: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        track.push(AudioBlock::new(block, format));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Chunk;
    use std::time::Duration;

    #[test]
    fn test_missing_tools_make_trim_unsupported() {
        let factory = FfmpegPlayerFactory::with_binaries(
            "studio-recorder-no-such-ffmpeg",
            "studio-recorder-no-such-ffprobe",
            AudioFormat::default(),
        );
        assert!(!factory.is_available());

        let artifact = PreviewArtifact::assemble(
            &[Chunk::new(vec![0; 8], "video/webm")],
            Duration::from_millis(100),
        )
        .unwrap();
        let result = factory.load(&artifact);
        assert!(matches!(result, Err(EngineError::TrimUnsupported(_))));
        assert_eq!(factory.probe_duration(&artifact), None);
    }
}
