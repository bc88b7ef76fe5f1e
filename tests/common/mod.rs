// Fake collaborators shared by the engine integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use studio_recorder::capture::{
    AudioBlock, AudioFormat, AudioSource, CaptureProvider, Resolution, ScreenCapture,
    ScreenRequest, VideoFrame, VideoSource,
};
use studio_recorder::config::EngineConfig;
use studio_recorder::encoder::{Encoder, EncoderConfig, EncoderEvent, EncoderFactory, EncoderState};
use studio_recorder::store::{Chunk, FileChunkLog, PreviewArtifact};
use studio_recorder::trim::{PlaybackStream, Player, PlayerFactory};
use studio_recorder::{Collaborators, EngineError, EngineResult, RecordingCoordinator, RecordingStatus};
use tokio::sync::mpsc;

/// Video track with a fixed frame
pub struct FakeVideo {
    label: String,
    frame: Arc<VideoFrame>,
    ended: AtomicBool,
    stopped: AtomicBool,
}

impl FakeVideo {
    pub fn new(label: &str, width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            frame: Arc::new(VideoFrame::solid(width, height, [30, 60, 90, 255])),
            ended: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// The host ended the share
    pub fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl VideoSource for FakeVideo {
    fn label(&self) -> &str {
        &self.label
    }

    fn dimensions(&self) -> Resolution {
        Resolution::new(self.frame.width, self.frame.height)
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        Some(Arc::clone(&self.frame))
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst) || self.stopped.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Audio track producing a constant 10 ms block at real-time pace
pub struct FakeAudio {
    label: String,
    value: f32,
    next_due: Mutex<Instant>,
    stopped: AtomicBool,
}

impl FakeAudio {
    pub fn new(label: &str, value: f32) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            value,
            next_due: Mutex::new(Instant::now()),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl AudioSource for FakeAudio {
    fn label(&self) -> &str {
        &self.label
    }

    fn read(&self) -> Option<AudioBlock> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        let mut next_due = self.next_due.lock();
        let now = Instant::now();
        if now < *next_due {
            return None;
        }
        *next_due = now + Duration::from_millis(10);
        let format = AudioFormat::default();
        let samples = format.frames_for_ms(10) * format.channels as usize;
        Some(AudioBlock::new(vec![self.value; samples], format))
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Capture provider with switchable permission outcomes
pub struct FakeCapture {
    pub screen: Arc<FakeVideo>,
    pub system_audio: Arc<FakeAudio>,
    pub microphone: Arc<FakeAudio>,
    pub webcam: Arc<FakeVideo>,
    pub deny_screen: AtomicBool,
    pub deny_microphone: AtomicBool,
    pub deny_webcam: AtomicBool,
    pub webcam_requests: AtomicUsize,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            screen: FakeVideo::new("screen", 64, 36),
            system_audio: FakeAudio::new("system", 0.2),
            microphone: FakeAudio::new("microphone", 0.1),
            webcam: FakeVideo::new("webcam", 32, 24),
            deny_screen: AtomicBool::new(false),
            deny_microphone: AtomicBool::new(false),
            deny_webcam: AtomicBool::new(false),
            webcam_requests: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl CaptureProvider for FakeCapture {
    async fn acquire_screen(&self, _request: ScreenRequest) -> EngineResult<ScreenCapture> {
        if self.deny_screen.load(Ordering::SeqCst) {
            return Err(EngineError::PermissionDenied("screen".to_string()));
        }
        Ok(ScreenCapture {
            video: Arc::clone(&self.screen) as Arc<dyn VideoSource>,
            audio: Some(Arc::clone(&self.system_audio) as Arc<dyn AudioSource>),
        })
    }

    async fn acquire_microphone(&self) -> EngineResult<Arc<dyn AudioSource>> {
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(EngineError::DeviceUnavailable("microphone".to_string()));
        }
        Ok(Arc::clone(&self.microphone) as Arc<dyn AudioSource>)
    }

    async fn acquire_webcam(&self) -> EngineResult<Arc<dyn VideoSource>> {
        self.webcam_requests.fetch_add(1, Ordering::SeqCst);
        if self.deny_webcam.load(Ordering::SeqCst) {
            return Err(EngineError::PermissionDenied("webcam".to_string()));
        }
        Ok(Arc::clone(&self.webcam) as Arc<dyn VideoSource>)
    }
}

/// Encoder emitting a small chunk every interval while recording
pub struct FakeEncoder {
    config: EncoderConfig,
    emit_chunks: bool,
    state: Arc<Mutex<EncoderState>>,
    stop_requested: Arc<AtomicBool>,
}

impl Encoder for FakeEncoder {
    fn start(&self, events: mpsc::UnboundedSender<EncoderEvent>) -> EngineResult<()> {
        *self.state.lock() = EncoderState::Recording;
        let state = Arc::clone(&self.state);
        let stop_requested = Arc::clone(&self.stop_requested);
        let mime_type = self.config.mime_type.clone();
        let interval = Duration::from_millis(self.config.chunk_interval_ms.max(1));
        let emit_chunks = self.emit_chunks;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut seq: u8 = 0;
            loop {
                ticker.tick().await;
                if stop_requested.load(Ordering::SeqCst) {
                    break;
                }
                if emit_chunks && *state.lock() == EncoderState::Recording {
                    seq = seq.wrapping_add(1);
                    let chunk = Chunk::new(vec![seq; 4], mime_type.as_str());
                    if events.send(EncoderEvent::Chunk(chunk)).is_err() {
                        return;
                    }
                }
            }
            *state.lock() = EncoderState::Inactive;
            let _ = events.send(EncoderEvent::Stopped);
        });
        Ok(())
    }

    fn pause(&self) -> EngineResult<()> {
        *self.state.lock() = EncoderState::Paused;
        Ok(())
    }

    fn resume(&self) -> EngineResult<()> {
        *self.state.lock() = EncoderState::Recording;
        Ok(())
    }

    fn stop(&self) -> EngineResult<()> {
        self.stop_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> EncoderState {
        *self.state.lock()
    }
}

/// How the fake factory answers `create`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderMode {
    Chunks,
    Silent,
    Unsupported,
    Broken,
}

pub struct FakeEncoders {
    pub mode: Mutex<EncoderMode>,
    pub last_config: Mutex<Option<EncoderConfig>>,
    pub last_video: Mutex<Option<String>>,
}

impl FakeEncoders {
    pub fn new(mode: EncoderMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            last_config: Mutex::new(None),
            last_video: Mutex::new(None),
        })
    }
}

impl EncoderFactory for FakeEncoders {
    fn is_supported(&self, mime_type: &str) -> bool {
        mime_type.starts_with("video/webm")
    }

    fn create(
        &self,
        config: EncoderConfig,
        video: Arc<dyn VideoSource>,
        _audio: Option<Arc<dyn AudioSource>>,
    ) -> EngineResult<Box<dyn Encoder>> {
        *self.last_video.lock() = Some(video.label().to_string());
        *self.last_config.lock() = Some(config.clone());
        let emit_chunks = match *self.mode.lock() {
            EncoderMode::Chunks => true,
            EncoderMode::Silent => false,
            EncoderMode::Unsupported => {
                return Err(EngineError::EncodingUnsupported(config.mime_type))
            }
            EncoderMode::Broken => return Err(EngineError::Encoding("encoder crashed".to_string())),
        };
        Ok(Box::new(FakeEncoder {
            config,
            emit_chunks,
            state: Arc::new(Mutex::new(EncoderState::Inactive)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// Player factory for a host without capturable playback
pub struct NoPlayback;

impl PlayerFactory for NoPlayback {
    fn load(&self, _artifact: &PreviewArtifact) -> EngineResult<Box<dyn Player>> {
        Err(EngineError::TrimUnsupported("no playback capture".to_string()))
    }
}

/// Player whose media reports a fixed length but whose output cannot be
/// captured
pub struct MediaPlayback {
    pub duration: f64,
}

struct UncapturedPlayer {
    duration: f64,
}

impl Player for UncapturedPlayer {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn capture_stream(&self) -> Option<PlaybackStream> {
        None
    }

    fn seek(&self, _seconds: f64) -> EngineResult<()> {
        Ok(())
    }

    fn play(&self) -> EngineResult<()> {
        Ok(())
    }

    fn pause(&self) {}

    fn current_time(&self) -> f64 {
        0.0
    }

    fn is_ended(&self) -> bool {
        true
    }
}

impl PlayerFactory for MediaPlayback {
    fn load(&self, _artifact: &PreviewArtifact) -> EngineResult<Box<dyn Player>> {
        Ok(Box::new(UncapturedPlayer {
            duration: self.duration,
        }))
    }
}

/// Test config with short timers and the log under `store_dir`
pub fn test_config(store_dir: &Path) -> EngineConfig {
    EngineConfig {
        chunk_interval_ms: 10,
        countdown_tick_ms: 10,
        store_dir: store_dir.to_path_buf(),
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub coordinator: RecordingCoordinator,
    pub capture: Arc<FakeCapture>,
    pub encoders: Arc<FakeEncoders>,
}

pub fn harness(store_dir: &Path, mode: EncoderMode) -> Harness {
    harness_with_players(store_dir, mode, Arc::new(NoPlayback))
}

pub fn harness_with_players(
    store_dir: &Path,
    mode: EncoderMode,
    players: Arc<dyn PlayerFactory>,
) -> Harness {
    let config = test_config(store_dir);
    let capture = FakeCapture::new();
    let encoders = FakeEncoders::new(mode);
    let collaborators = Collaborators {
        capture: Arc::clone(&capture) as Arc<dyn CaptureProvider>,
        encoders: Arc::clone(&encoders) as Arc<dyn EncoderFactory>,
        players,
        log: Arc::new(FileChunkLog::new(config.store_dir.clone())),
    };
    Harness {
        coordinator: RecordingCoordinator::new(config, collaborators),
        capture,
        encoders,
    }
}

/// Poll until the coordinator reaches `status`
pub async fn wait_for_status(
    coordinator: &RecordingCoordinator,
    status: RecordingStatus,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if coordinator.status() == status {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    coordinator.status() == status
}
