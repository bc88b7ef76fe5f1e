//! Live encoder backed by an ffmpeg child process
//!
//! Three worker threads serve one process: the video feeder writes the
//! latest frame to stdin at the configured rate, the audio feeder streams
//! f32le PCM over a loopback socket, and the output reader cuts stdout into
//! chunks on the timeslice boundary.

use super::args::{live_encode_args, plan_codecs, LiveEncodeArgs};
use super::probe::tool_available;
use crate::capture::{AudioFormat, AudioSource, VideoFrame, VideoSource};
use crate::encoder::{Encoder, EncoderConfig, EncoderEvent, EncoderFactory, EncoderState};
use crate::store::Chunk;
use crate::utils::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// How long the audio feeder waits for ffmpeg to connect
const AUDIO_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Audio feeder poll period
const AUDIO_POLL: Duration = Duration::from_millis(5);

/// Creates ffmpeg-backed encoders
pub struct FfmpegEncoderFactory {
    ffmpeg: String,
    available: bool,
    audio_format: AudioFormat,
}

impl FfmpegEncoderFactory {
    /// Use `ffmpeg` from PATH
    pub fn new(audio_format: AudioFormat) -> Self {
        Self::with_binary("ffmpeg", audio_format)
    }

    pub fn with_binary(ffmpeg: impl Into<String>, audio_format: AudioFormat) -> Self {
        let ffmpeg = ffmpeg.into();
        let available = tool_available(&ffmpeg);
        if !available {
            tracing::warn!("{} not found, live encoding unavailable", ffmpeg);
        }
        Self {
            ffmpeg,
            available,
            audio_format,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn is_supported(&self, mime_type: &str) -> bool {
        self.available && plan_codecs(mime_type).is_ok()
    }

    fn create(
        &self,
        config: EncoderConfig,
        video: Arc<dyn VideoSource>,
        audio: Option<Arc<dyn AudioSource>>,
    ) -> EngineResult<Box<dyn Encoder>> {
        if !self.available {
            return Err(EngineError::EncodingUnsupported(format!(
                "{} is not installed",
                self.ffmpeg
            )));
        }
        plan_codecs(&config.mime_type)?;

        let size = video.dimensions();
        if size.width == 0 || size.height == 0 || size.width % 2 != 0 || size.height % 2 != 0 {
            return Err(EngineError::EncodingUnsupported(format!(
                "frame size {}x{} must be non-zero and even",
                size.width, size.height
            )));
        }

        Ok(Box::new(FfmpegEncoder {
            ffmpeg: self.ffmpeg.clone(),
            config,
            audio_format: self.audio_format,
            video,
            audio,
            control: Arc::new(Control::default()),
            state: Mutex::new(EncoderState::Inactive),
        }))
    }
}

#[derive(Default)]
struct Control {
    stop: AtomicBool,
    paused: AtomicBool,
}

/// One live ffmpeg encode
pub struct FfmpegEncoder {
    ffmpeg: String,
    config: EncoderConfig,
    audio_format: AudioFormat,
    video: Arc<dyn VideoSource>,
    audio: Option<Arc<dyn AudioSource>>,
    control: Arc<Control>,
    state: Mutex<EncoderState>,
}

impl Encoder for FfmpegEncoder {
    fn start(&self, events: mpsc::UnboundedSender<EncoderEvent>) -> EngineResult<()> {
        let mut state = self.state.lock();
        if *state != EncoderState::Inactive || self.control.stop.load(Ordering::Relaxed) {
            return Err(EngineError::Encoding("Encoder already started".to_string()));
        }

        let plan = plan_codecs(&self.config.mime_type)?;
        let listener = match self.audio {
            Some(_) => Some(TcpListener::bind("127.0.0.1:0")?),
            None => None,
        };
        let audio_port = match &listener {
            Some(l) => Some(l.local_addr()?.port()),
            None => None,
        };

        let args = live_encode_args(
            &plan,
            &LiveEncodeArgs {
                size: self.video.dimensions(),
                frame_rate: self.config.frame_rate.max(1),
                video_bitrate: self.config.video_bitrate,
                audio_bitrate: self.config.audio_bitrate,
                chunk_interval_ms: self.config.chunk_interval_ms,
                audio_port,
                audio_format: self.audio_format,
            },
        );
        tracing::info!("Starting FFmpeg live encoder: {:?}", args);

        let mut process = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| EngineError::Ffmpeg(format!("Failed to start FFmpeg encoder: {}", e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Ffmpeg("Failed to capture FFmpeg stdin".to_string()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| EngineError::Ffmpeg("Failed to capture FFmpeg stdout".to_string()))?;

        let frame_period = Duration::from_secs_f64(1.0 / self.config.frame_rate.max(1) as f64);
        let video = Arc::clone(&self.video);
        let control = Arc::clone(&self.control);
        thread::spawn(move || feed_video(stdin, video, control, frame_period));

        if let (Some(listener), Some(audio)) = (listener, self.audio.clone()) {
            let control = Arc::clone(&self.control);
            let format = self.audio_format;
            thread::spawn(move || feed_audio(listener, audio, control, format));
        }

        let mime_type = self.config.mime_type.clone();
        let interval = Duration::from_millis(self.config.chunk_interval_ms.max(1));
        let control = Arc::clone(&self.control);
        thread::spawn(move || read_output(process, stdout, mime_type, interval, control, events));

        *state = EncoderState::Recording;
        Ok(())
    }

    fn pause(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if *state == EncoderState::Recording {
            self.control.paused.store(true, Ordering::Relaxed);
            *state = EncoderState::Paused;
        }
        Ok(())
    }

    fn resume(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if *state == EncoderState::Paused {
            self.control.paused.store(false, Ordering::Relaxed);
            *state = EncoderState::Recording;
        }
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        if !self.control.stop.swap(true, Ordering::Relaxed) {
            tracing::debug!("Stopping FFmpeg live encoder");
        }
        *state = EncoderState::Inactive;
        Ok(())
    }

    fn state(&self) -> EncoderState {
        *self.state.lock()
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        self.control.stop.store(true, Ordering::Relaxed);
    }
}

fn feed_video(
    mut stdin: ChildStdin,
    video: Arc<dyn VideoSource>,
    control: Arc<Control>,
    period: Duration,
) {
    let size = video.dimensions();
    let blank = VideoFrame::solid(size.width, size.height, [0, 0, 0, 255]);
    let mut last: Option<Arc<VideoFrame>> = None;
    let mut next = Instant::now();
    let mut written = 0u64;

    while !control.stop.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            thread::sleep(next - now);
        }
        next += period;

        if control.paused.load(Ordering::Relaxed) {
            continue;
        }

        if let Some(frame) = video.latest_frame() {
            if frame.width == size.width && frame.height == size.height && frame.is_well_formed() {
                last = Some(frame);
            }
        }
        let data = last.as_ref().map(|f| f.data.as_slice()).unwrap_or(blank.data.as_slice());
        if let Err(e) = stdin.write_all(data) {
            tracing::warn!("FFmpeg stdin closed: {}", e);
            break;
        }
        written += 1;
    }

    tracing::debug!("Video feeder finished after {} frames", written);
}

fn accept_with_timeout(listener: &TcpListener, control: &Control) -> Option<TcpStream> {
    if listener.set_nonblocking(true).is_err() {
        return None;
    }
    let deadline = Instant::now() + AUDIO_CONNECT_TIMEOUT;
    while Instant::now() < deadline && !control.stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => {
                let _ = stream.set_nonblocking(false);
                return Some(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => thread::sleep(AUDIO_POLL),
            Err(e) => {
                tracing::warn!("Audio input accept failed: {}", e);
                return None;
            }
        }
    }
    None
}

fn feed_audio(
    listener: TcpListener,
    audio: Arc<dyn AudioSource>,
    control: Arc<Control>,
    format: AudioFormat,
) {
    let Some(mut stream) = accept_with_timeout(&listener, &control) else {
        tracing::warn!("FFmpeg never connected to the audio input");
        return;
    };

    let mut bytes = Vec::new();
    while !control.stop.load(Ordering::Relaxed) {
        let mut wrote = false;
        while let Some(block) = audio.read() {
            if control.paused.load(Ordering::Relaxed) {
                continue;
            }
            if block.format != format {
                tracing::warn!(
                    "Dropping audio block in {:?}, encoder expects {:?}",
                    block.format,
                    format
                );
                continue;
            }
            bytes.clear();
            for sample in &block.samples {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            if let Err(e) = stream.write_all(&bytes) {
                tracing::warn!("FFmpeg audio input closed: {}", e);
                return;
            }
            wrote = true;
        }
        if !wrote {
            thread::sleep(AUDIO_POLL);
        }
    }

    let _ = stream.shutdown(Shutdown::Both);
}

fn read_output(
    mut process: Child,
    mut stdout: ChildStdout,
    mime_type: String,
    interval: Duration,
    control: Arc<Control>,
    events: mpsc::UnboundedSender<EncoderEvent>,
) {
    let mut pending = Vec::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut slice_start = Instant::now();
    let mut emitted = 0u64;
    let mut read_error = None;

    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => pending.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                read_error = Some(e.to_string());
                break;
            }
        }
        if slice_start.elapsed() >= interval && !pending.is_empty() {
            let data = std::mem::take(&mut pending);
            let _ = events.send(EncoderEvent::Chunk(Chunk::new(data, mime_type.clone())));
            emitted += 1;
            slice_start = Instant::now();
        }
    }

    if !pending.is_empty() {
        let _ = events.send(EncoderEvent::Chunk(Chunk::new(pending, mime_type)));
        emitted += 1;
    }

    let status = process.wait();
    let requested = control.stop.load(Ordering::Relaxed);
    let failure = match (read_error, status) {
        (Some(e), _) => Some(format!("Failed to read FFmpeg output: {}", e)),
        (None, Err(e)) => Some(format!("Failed to wait for FFmpeg: {}", e)),
        (None, Ok(s)) if !s.success() && !requested => Some(format!("FFmpeg exited with {}", s)),
        _ => None,
    };

    match failure {
        Some(msg) => {
            tracing::error!("{}", msg);
            let _ = events.send(EncoderEvent::Failed(msg));
        }
        None => {
            tracing::info!("FFmpeg live encoder finished: {} chunks", emitted);
            let _ = events.send(EncoderEvent::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Resolution;

    struct Still(Resolution);

    impl VideoSource for Still {
        fn label(&self) -> &str {
            "still"
        }

        fn dimensions(&self) -> Resolution {
            self.0
        }

        fn is_ready(&self) -> bool {
            false
        }

        fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
            None
        }

        fn stop(&self) {}
    }

    fn config() -> EncoderConfig {
        EncoderConfig {
            mime_type: "video/webm;codecs=vp9,opus".to_string(),
            video_bitrate: 5_000_000,
            audio_bitrate: 320_000,
            chunk_interval_ms: 100,
            frame_rate: 30,
        }
    }

    #[test]
    fn test_missing_binary_reports_unsupported() {
        let factory =
            FfmpegEncoderFactory::with_binary("studio-recorder-no-such-ffmpeg", AudioFormat::default());
        assert!(!factory.is_available());
        assert!(!factory.is_supported("video/webm"));

        let result = factory.create(config(), Arc::new(Still(Resolution::new(1280, 720))), None);
        assert!(matches!(result, Err(EngineError::EncodingUnsupported(_))));
    }

    #[test]
    fn test_odd_frame_size_is_rejected() {
        let factory = FfmpegEncoderFactory {
            ffmpeg: "ffmpeg".to_string(),
            available: true,
            audio_format: AudioFormat::default(),
        };
        let result = factory.create(config(), Arc::new(Still(Resolution::new(1281, 720))), None);
        assert!(matches!(result, Err(EngineError::EncodingUnsupported(_))));
    }
}
