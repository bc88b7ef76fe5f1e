//! Recording coordinator
//!
//! Owns the session state machine and everything a session holds: device
//! streams, the audio mix graph, the render loop, the encoder and the chunk
//! store. All public operations take `&self`; the coordinator is cheap to
//! clone and safe to share between tasks.

use super::resources::{AudioStream, EncoderGuard, ResourceStack, TaskGuard, VideoStream};
use super::state::{RecorderSettings, RecordingSession, RecordingStatus};
use crate::audio::{
    AudioPump, FrequencySnapshot, MixGraph, MixInputs, MixedTrack, SharedGraph, SourceKind,
};
use crate::capture::{
    AudioSource, CaptureProvider, Resolution, ScreenRequest, VideoFrame, VideoSource,
};
use crate::config::EngineConfig;
use crate::encoder::{
    supported_formats, Encoder, EncoderConfig, EncoderEvent, EncoderFactory, FormatOption,
};
use crate::ffmpeg::{FfmpegEncoderFactory, FfmpegPlayerFactory};
use crate::render::{
    load_watermark, Color, CompositeState, Compositor, FrameSurface, InputEvent, InputQueue,
    RenderInputs, RenderLoop, SharedComposite,
};
use crate::store::{ChunkLog, ChunkStore, FileChunkLog, PreviewArtifact};
use crate::trim::{PlayerFactory, TrimPipeline};
use crate::utils::error::{EngineError, EngineResult};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;

/// How long stop waits for the encoder's final chunk
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll period for a screen share ended by the host
const SCREEN_WATCH_PERIOD: Duration = Duration::from_millis(250);

/// Events emitted during recording
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    /// The session moved to a new status
    StatusChanged(RecordingStatus),
    /// Countdown tick, counting down to 1
    Countdown(u32),
    /// Seconds spent recording
    Elapsed(u64),
    /// A chunk reached the store
    ChunkStored { index: usize, bytes: usize },
    /// A preview artifact is available
    PreviewReady { bytes: usize, duration: f64 },
    /// The session failed with this message
    Error(String),
}

/// Route and overlay preferences that outlive a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub microphone_muted: bool,
    pub system_audio_muted: bool,
    pub webcam_enabled: bool,
}

/// Host-provided collaborators
pub struct Collaborators {
    pub capture: Arc<dyn CaptureProvider>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub players: Arc<dyn PlayerFactory>,
    pub log: Arc<dyn ChunkLog>,
}

impl Collaborators {
    /// ffmpeg encoder and player with the durable log under
    /// `config.store_dir`
    pub fn with_ffmpeg(capture: Arc<dyn CaptureProvider>, config: &EngineConfig) -> Self {
        Self {
            capture,
            encoders: Arc::new(FfmpegEncoderFactory::new(config.audio.format)),
            players: Arc::new(FfmpegPlayerFactory::new(config.audio.format)),
            log: Arc::new(FileChunkLog::new(config.store_dir.clone())),
        }
    }
}

/// Resources of the session currently holding devices
struct ActiveSession {
    generation: u64,
    resources: ResourceStack,
    screen: Arc<dyn VideoSource>,
    graph: SharedGraph,
    track: Option<Arc<MixedTrack>>,
    surface: Arc<FrameSurface>,
    encoder: Option<Arc<dyn Encoder>>,
    /// Drains encoder events; finishes the session when the encoder stops
    chunk_pump: Option<JoinHandle<()>>,
}

struct Inner {
    config: EngineConfig,
    collaborators: Collaborators,
    store: ChunkStore,
    session: RwLock<RecordingSession>,
    settings: RwLock<RecorderSettings>,
    preferences: Mutex<Preferences>,
    composite: SharedComposite,
    input: InputQueue,
    active: Mutex<Option<ActiveSession>>,
    countdown_cancel: Mutex<Option<Arc<Notify>>>,
    preview: RwLock<Option<PreviewArtifact>>,
    /// Held by start's status transition and by every operation that
    /// clears the durable log outside a session
    log_gate: tokio::sync::Mutex<()>,
    /// Bumped on every accepted start; stale callbacks compare against it
    generation: AtomicU64,
    event_tx: broadcast::Sender<RecordingEvent>,
}

/// Which way a stop request goes
enum StopPath {
    Cancel,
    Finalize(u64),
    Ignore(RecordingStatus),
}

/// Orchestrates one recording session at a time
#[derive(Clone)]
pub struct RecordingCoordinator {
    inner: Arc<Inner>,
}

impl RecordingCoordinator {
    /// Create a new recording coordinator
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let store = ChunkStore::new(Arc::clone(&collaborators.log));
        let composite = CompositeState::shared(&config.render);
        Self {
            inner: Arc::new(Inner {
                config,
                collaborators,
                store,
                session: RwLock::new(RecordingSession::default()),
                settings: RwLock::new(RecorderSettings::default()),
                preferences: Mutex::new(Preferences::default()),
                composite,
                input: InputQueue::new(),
                active: Mutex::new(None),
                countdown_cancel: Mutex::new(None),
                preview: RwLock::new(None),
                log_gate: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                event_tx,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Snapshot of the canonical session status
    pub fn session(&self) -> RecordingSession {
        self.inner.session.read().clone()
    }

    pub fn status(&self) -> RecordingStatus {
        self.inner.session.read().status
    }

    /// Settings of the current or last session
    pub fn settings(&self) -> RecorderSettings {
        self.inner.settings.read().clone()
    }

    pub fn preferences(&self) -> Preferences {
        *self.inner.preferences.lock()
    }

    /// Formats the encoder factory can produce, in preference order
    pub fn supported_formats(&self) -> Vec<FormatOption> {
        supported_formats(self.inner.collaborators.encoders.as_ref())
    }

    fn emit(&self, event: RecordingEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    /// Start a session. A start while busy is ignored.
    pub async fn start(&self, settings: RecorderSettings) -> EngineResult<()> {
        let gate = self.inner.log_gate.lock().await;
        let generation = {
            let mut session = self.inner.session.write();
            if !session.status.accepts_start() {
                tracing::debug!("Ignoring start while {:?}", session.status);
                return Ok(());
            }
            *session = RecordingSession::begin();
            self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        drop(gate);
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Processing));

        tracing::info!(
            "Starting {:?} recording: {:?} @ {} fps, {}",
            settings.recording_mode,
            settings.quality,
            settings.frame_rate,
            settings.mime_type
        );

        self.teardown();
        *self.inner.settings.write() = settings.clone();
        *self.inner.preview.write() = None;
        self.inner.input.clear();
        self.inner.store.begin_session().await;

        let active = match self.acquire(generation, &settings).await {
            Ok(active) => active,
            Err(e) => {
                self.fail(e.to_string());
                return Err(e);
            }
        };
        *self.inner.active.lock() = Some(active);

        if !self.run_countdown(generation, settings.countdown_duration).await {
            return Ok(());
        }

        self.begin_encoding(generation, &settings)
    }

    /// Acquire streams, build the mix graph and start the render loop.
    /// Everything acquired is released if a later step fails.
    async fn acquire(
        &self,
        generation: u64,
        settings: &RecorderSettings,
    ) -> EngineResult<ActiveSession> {
        let config = &self.inner.config;
        let capture = &self.inner.collaborators.capture;
        let mut resources = ResourceStack::new();

        let request = ScreenRequest {
            resolution: settings.quality.resolution(),
            frame_rate: settings.frame_rate,
            hide_cursor: settings.hide_cursor,
        };
        let screen = capture.acquire_screen(request).await?;
        tracing::info!("Screen acquired: {}", screen.video.label());
        resources.push(VideoStream::new(Arc::clone(&screen.video)));
        if let Some(audio) = &screen.audio {
            resources.push(AudioStream::new(Arc::clone(audio)));
        }

        let microphone = if settings.enable_audio {
            match capture.acquire_microphone().await {
                Ok(microphone) => {
                    resources.push(AudioStream::new(Arc::clone(&microphone)));
                    Some(microphone)
                }
                Err(e) => {
                    tracing::warn!("Microphone unavailable, recording without it: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let webcam_wanted = settings.is_studio() && self.inner.preferences.lock().webcam_enabled;
        let webcam = if webcam_wanted {
            match capture.acquire_webcam().await {
                Ok(webcam) => {
                    resources.push(VideoStream::new(Arc::clone(&webcam)));
                    Some(webcam)
                }
                Err(e) => {
                    tracing::warn!("Webcam unavailable, disabling it: {}", e);
                    self.inner.preferences.lock().webcam_enabled = false;
                    None
                }
            }
        } else {
            None
        };

        let preferences = self.preferences();
        let graph: SharedGraph = Arc::new(Mutex::new(MixGraph::build(
            MixInputs {
                microphone,
                system_audio: screen.audio.clone(),
                studio: settings.is_studio(),
                microphone_muted: preferences.microphone_muted,
                system_audio_muted: preferences.system_audio_muted,
            },
            &config.audio,
        )));
        let pump = AudioPump::spawn(
            Arc::clone(&graph),
            Duration::from_millis(config.audio.quantum_ms),
            Duration::from_millis(config.audio.max_buffer_ms),
        );
        let track = pump.track();
        resources.push(pump);

        let surface_size = surface_size(screen.video.dimensions(), request.resolution);
        {
            let mut composite = self.inner.composite.lock();
            composite.reset_for_session(surface_size, &config.render);
            composite.webcam.active = preferences.webcam_enabled;
        }

        let render_loop = RenderLoop::spawn(
            Compositor::new(surface_size, config.render.clone()),
            RenderInputs {
                screen: Arc::clone(&screen.video),
                webcam,
                state: Arc::clone(&self.inner.composite),
                input: self.inner.input.clone(),
            },
            settings.frame_rate,
        );
        let surface = render_loop.surface();
        resources.push(render_loop);

        tracing::info!("Acquired {} session resources", resources.len());
        Ok(ActiveSession {
            generation,
            resources,
            screen: screen.video,
            graph,
            track,
            surface,
            encoder: None,
            chunk_pump: None,
        })
    }

    /// Count down one tick at a time. Returns false when stop cancelled it.
    async fn run_countdown(&self, generation: u64, ticks: u32) -> bool {
        let cancel = Arc::new(Notify::new());
        *self.inner.countdown_cancel.lock() = Some(Arc::clone(&cancel));
        {
            let mut session = self.inner.session.write();
            if session.status != RecordingStatus::Processing || !self.is_current(generation) {
                return false;
            }
            session.status = RecordingStatus::Countdown;
            session.countdown_value = ticks;
        }
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Countdown));
        tracing::info!("Countdown started: {} ticks", ticks);

        let tick = self.inner.config.countdown_tick();
        for remaining in (1..=ticks).rev() {
            self.inner.session.write().countdown_value = remaining;
            self.emit(RecordingEvent::Countdown(remaining));
            tokio::select! {
                _ = tokio::time::sleep(tick) => {}
                _ = cancel.notified() => {
                    tracing::info!("Countdown cancelled at {}", remaining);
                    return false;
                }
            }
        }
        self.inner.countdown_cancel.lock().take();

        let session = self.inner.session.read();
        session.status == RecordingStatus::Countdown && self.is_current(generation)
    }

    /// Create and start the encoder, then enter `Recording`
    fn begin_encoding(&self, generation: u64, settings: &RecorderSettings) -> EngineResult<()> {
        let (video, audio, screen) = {
            let active = self.inner.active.lock();
            match active.as_ref() {
                Some(active) if active.generation == generation => {
                    let video: Arc<dyn VideoSource> = if settings.is_studio() {
                        Arc::clone(&active.surface) as Arc<dyn VideoSource>
                    } else {
                        Arc::clone(&active.screen)
                    };
                    let audio = active
                        .track
                        .as_ref()
                        .map(|t| Arc::clone(t) as Arc<dyn AudioSource>);
                    (video, audio, Arc::clone(&active.screen))
                }
                _ => return Ok(()),
            }
        };

        let config = EncoderConfig {
            mime_type: settings.mime_type.clone(),
            video_bitrate: settings.video_bitrate(),
            audio_bitrate: self.inner.config.audio.audio_bitrate,
            chunk_interval_ms: self.inner.config.chunk_interval_ms,
            frame_rate: settings.frame_rate,
        };
        let encoder: Arc<dyn Encoder> =
            match self.inner.collaborators.encoders.create(config, video, audio) {
                Ok(encoder) => Arc::from(encoder),
                Err(e @ EngineError::EncodingUnsupported(_)) => {
                    tracing::warn!("Encoder rejected the configuration: {}", e);
                    self.abandon(generation);
                    return Err(e);
                }
                Err(e) => {
                    self.fail(e.to_string());
                    return Err(e);
                }
            };

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = encoder.start(tx) {
            self.fail(e.to_string());
            return Err(e);
        }

        let chunk_pump = self.spawn_chunk_pump(generation, rx);
        let ticker = self.spawn_elapsed_ticker();
        let watcher = self.spawn_screen_watcher(screen);

        let attached = {
            let mut active = self.inner.active.lock();
            match active.as_mut() {
                Some(active) if active.generation == generation => {
                    active.resources.push(TaskGuard::new("elapsed-ticker", ticker));
                    active.resources.push(TaskGuard::new("screen-watcher", watcher));
                    active.resources.push(EncoderGuard(Arc::clone(&encoder)));
                    active.encoder = Some(Arc::clone(&encoder));
                    active.chunk_pump = Some(chunk_pump);
                    true
                }
                _ => {
                    ticker.abort();
                    watcher.abort();
                    false
                }
            }
        };
        if !attached {
            let _ = encoder.stop();
            return Ok(());
        }

        {
            let mut session = self.inner.session.write();
            if session.status != RecordingStatus::Countdown {
                return Ok(());
            }
            session.status = RecordingStatus::Recording;
            session.countdown_value = 0;
        }
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Recording));
        tracing::info!("Recording started");
        Ok(())
    }

    fn spawn_chunk_pump(
        &self,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<EncoderEvent>,
    ) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut failure = None;
            while let Some(event) = events.recv().await {
                match event {
                    EncoderEvent::Chunk(chunk) => {
                        let bytes = chunk.len();
                        coordinator.inner.store.append(chunk).await;
                        let index = coordinator.inner.store.len();
                        coordinator.emit(RecordingEvent::ChunkStored { index, bytes });
                    }
                    EncoderEvent::Stopped => break,
                    EncoderEvent::Failed(message) => {
                        failure = Some(message);
                        break;
                    }
                }
            }
            coordinator.finish_session(generation, failure);
        })
    }

    fn spawn_elapsed_ticker(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let period = Duration::from_secs(1);
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let elapsed = {
                    let mut session = coordinator.inner.session.write();
                    if session.status != RecordingStatus::Recording {
                        continue;
                    }
                    session.elapsed_seconds += 1;
                    session.elapsed_seconds
                };
                coordinator.emit(RecordingEvent::Elapsed(elapsed));
            }
        })
    }

    fn spawn_screen_watcher(&self, screen: Arc<dyn VideoSource>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SCREEN_WATCH_PERIOD);
            loop {
                ticker.tick().await;
                if screen.is_ended() {
                    tracing::info!("Screen capture ended by the host, stopping");
                    // Stop tears this task down, so it runs detached
                    tokio::spawn(async move {
                        coordinator.stop().await;
                    });
                    break;
                }
            }
        })
    }

    /// Stop the session. Cancels a running countdown; otherwise finalizes a
    /// recording and returns the preview artifact, if any data was captured.
    pub async fn stop(&self) -> Option<PreviewArtifact> {
        let path = {
            let mut session = self.inner.session.write();
            match session.status {
                RecordingStatus::Countdown => {
                    session.reset();
                    StopPath::Cancel
                }
                RecordingStatus::Recording | RecordingStatus::Paused => {
                    session.status = RecordingStatus::Processing;
                    StopPath::Finalize(self.inner.generation.load(Ordering::SeqCst))
                }
                other => StopPath::Ignore(other),
            }
        };

        let generation = match path {
            StopPath::Ignore(status) => {
                tracing::debug!("Ignoring stop while {:?}", status);
                return None;
            }
            StopPath::Cancel => {
                if let Some(cancel) = self.inner.countdown_cancel.lock().take() {
                    cancel.notify_one();
                }
                self.teardown();
                self.emit(RecordingEvent::StatusChanged(RecordingStatus::Idle));
                tracing::info!("Recording cancelled during countdown");
                return None;
            }
            StopPath::Finalize(generation) => generation,
        };

        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Processing));
        tracing::info!("Stopping recording");

        let (encoder, chunk_pump) = {
            let mut active = self.inner.active.lock();
            match active.as_mut() {
                Some(active) if active.generation == generation => {
                    (active.encoder.clone(), active.chunk_pump.take())
                }
                _ => (None, None),
            }
        };

        if let Some(encoder) = encoder {
            if let Err(e) = encoder.stop() {
                tracing::warn!("Encoder stop request failed: {}", e);
            }
        }

        if let Some(chunk_pump) = chunk_pump {
            match tokio::time::timeout(STOP_TIMEOUT, chunk_pump).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Chunk pump ended abnormally: {}", e),
                Err(_) => tracing::warn!(
                    "Encoder did not stop within {:?}, finalizing buffered chunks",
                    STOP_TIMEOUT
                ),
            }
        }

        // No-op when the chunk pump already finished the session
        self.finish_session(generation, None);
        self.preview()
    }

    /// Release the session and assemble its artifact, or record a failure
    fn finish_session(&self, generation: u64, failure: Option<String>) {
        let active = {
            let mut active = self.inner.active.lock();
            if active.as_ref().map(|a| a.generation) != Some(generation) {
                return;
            }
            active.take()
        };
        let chunks = self.inner.store.take_chunks();
        if let Some(mut active) = active {
            active.resources.release_all();
        }

        if let Some(message) = failure {
            tracing::error!("Encoder failed: {}", message);
            self.inner.session.write().fail(message.clone());
            self.emit(RecordingEvent::Error(message));
            self.emit(RecordingEvent::StatusChanged(RecordingStatus::Error));
            return;
        }

        let artifact = PreviewArtifact::assemble(&chunks, self.inner.config.chunk_interval())
            .map(|artifact| self.measured(artifact));
        let ready = match &artifact {
            Some(artifact) => {
                tracing::info!(
                    "Recording finished: {} chunks, {} bytes, {:.1}s",
                    chunks.len(),
                    artifact.len(),
                    artifact.duration
                );
                Some(RecordingEvent::PreviewReady {
                    bytes: artifact.len(),
                    duration: artifact.duration,
                })
            }
            None => {
                tracing::info!("Recording finished with no data");
                None
            }
        };

        *self.inner.preview.write() = artifact;
        self.inner.session.write().reset();
        if let Some(ready) = ready {
            self.emit(ready);
        }
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Idle));
    }

    /// Pause the encoder; the graph and renderer keep running
    pub fn pause(&self) -> EngineResult<()> {
        let Some(encoder) = self.current_encoder() else {
            return Ok(());
        };
        {
            let mut session = self.inner.session.write();
            if session.status != RecordingStatus::Recording {
                return Ok(());
            }
            encoder.pause()?;
            session.status = RecordingStatus::Paused;
        }
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Paused));
        tracing::info!("Recording paused");
        Ok(())
    }

    pub fn resume(&self) -> EngineResult<()> {
        let Some(encoder) = self.current_encoder() else {
            return Ok(());
        };
        {
            let mut session = self.inner.session.write();
            if session.status != RecordingStatus::Paused {
                return Ok(());
            }
            encoder.resume()?;
            session.status = RecordingStatus::Recording;
        }
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Recording));
        tracing::info!("Recording resumed");
        Ok(())
    }

    fn current_encoder(&self) -> Option<Arc<dyn Encoder>> {
        self.inner.active.lock().as_ref().and_then(|a| a.encoder.clone())
    }

    /// Release every session resource. Idempotent.
    fn teardown(&self) {
        let active = self.inner.active.lock().take();
        if let Some(mut active) = active {
            tracing::info!("Releasing resources of session {}", active.generation);
            active.resources.release_all();
        }
    }

    /// Back to Idle after a capability failure
    fn abandon(&self, generation: u64) {
        self.teardown();
        {
            let mut session = self.inner.session.write();
            if !self.is_current(generation) || session.status.accepts_start() {
                return;
            }
            session.reset();
        }
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Idle));
    }

    fn fail(&self, message: String) {
        if let Some(cancel) = self.inner.countdown_cancel.lock().take() {
            cancel.notify_one();
        }
        self.teardown();
        tracing::error!("Recording failed: {}", message);
        self.inner.session.write().fail(message.clone());
        self.emit(RecordingEvent::Error(message));
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Error));
    }

    /// Stop any session and release everything
    pub async fn shutdown(&self) {
        self.stop().await;
        self.teardown();
    }

    pub fn toggle_microphone_mute(&self) -> bool {
        let muted = {
            let mut preferences = self.inner.preferences.lock();
            preferences.microphone_muted = !preferences.microphone_muted;
            preferences.microphone_muted
        };
        self.apply_mute(SourceKind::Microphone, muted);
        muted
    }

    pub fn toggle_system_audio_mute(&self) -> bool {
        let muted = {
            let mut preferences = self.inner.preferences.lock();
            preferences.system_audio_muted = !preferences.system_audio_muted;
            preferences.system_audio_muted
        };
        self.apply_mute(SourceKind::SystemAudio, muted);
        muted
    }

    fn apply_mute(&self, kind: SourceKind, muted: bool) {
        let graph = self.inner.active.lock().as_ref().map(|a| Arc::clone(&a.graph));
        let applied = graph.map(|g| g.lock().set_muted(kind, muted)).unwrap_or(false);
        tracing::info!(
            "{} {} (live route: {})",
            kind,
            if muted { "muted" } else { "unmuted" },
            applied
        );
    }

    /// Flip the webcam preference. The overlay is drawn only while a webcam
    /// stream is live.
    pub fn toggle_webcam(&self) -> bool {
        let enabled = {
            let mut preferences = self.inner.preferences.lock();
            preferences.webcam_enabled = !preferences.webcam_enabled;
            preferences.webcam_enabled
        };
        self.inner.composite.lock().webcam.active = enabled;
        enabled
    }

    pub fn toggle_drawing_mode(&self) -> bool {
        let mut composite = self.inner.composite.lock();
        composite.drawing_mode = !composite.drawing_mode;
        composite.drawing_mode
    }

    /// Color for strokes started from now on
    pub fn set_brush_color(&self, color: Color) {
        self.inner.composite.lock().brush_color = color;
    }

    pub fn clear_annotations(&self) {
        self.inner.composite.lock().clear_annotations();
    }

    /// Load a PNG watermark
    pub fn set_watermark(&self, path: &Path) -> EngineResult<()> {
        let image = load_watermark(path)?;
        tracing::info!("Watermark loaded: {}x{}", image.width, image.height);
        self.inner.composite.lock().watermark = Some(Arc::new(image));
        Ok(())
    }

    pub fn clear_watermark(&self) {
        self.inner.composite.lock().watermark = None;
    }

    /// Queue a pointer event for the next rendered frame
    pub fn push_input(&self, event: InputEvent) {
        self.inner.input.push(event);
    }

    /// Overlay state shared with the renderer
    pub fn composite(&self) -> SharedComposite {
        Arc::clone(&self.inner.composite)
    }

    /// Microphone frequency snapshot, None without a live microphone route
    pub fn microphone_levels(&self) -> Option<FrequencySnapshot> {
        let graph = self.inner.active.lock().as_ref().map(|a| Arc::clone(&a.graph))?;
        let analyser = graph.lock().analyser()?;
        let snapshot = analyser.lock().snapshot();
        Some(snapshot)
    }

    /// Latest composited frame for live preview
    pub fn preview_frame(&self) -> Option<Arc<VideoFrame>> {
        let surface = self.inner.active.lock().as_ref().map(|a| Arc::clone(&a.surface))?;
        surface.latest_frame()
    }

    pub fn preview(&self) -> Option<PreviewArtifact> {
        self.inner.preview.read().clone()
    }

    /// Whether a prior recording is waiting in the durable log
    pub async fn has_recovery(&self) -> bool {
        if self.status() != RecordingStatus::Idle {
            return false;
        }
        self.inner.store.has_recovery().await
    }

    /// Rebuild the preview from the durable log
    pub async fn recover(&self) -> EngineResult<Option<PreviewArtifact>> {
        let status = self.status();
        if status != RecordingStatus::Idle {
            return Err(EngineError::Busy(format!("cannot recover while {:?}", status)));
        }

        let chunks = self.inner.store.recover().await?;
        let artifact = PreviewArtifact::assemble(&chunks, self.inner.config.chunk_interval())
            .map(|artifact| self.measured(artifact));
        match &artifact {
            Some(artifact) => {
                tracing::info!(
                    "Recovered {} chunks ({} bytes)",
                    chunks.len(),
                    artifact.len()
                );
                self.emit(RecordingEvent::PreviewReady {
                    bytes: artifact.len(),
                    duration: artifact.duration,
                });
            }
            None => tracing::info!("Nothing to recover"),
        }
        *self.inner.preview.write() = artifact.clone();
        Ok(artifact)
    }

    /// Replace the estimated duration with the one the media reports
    fn measured(&self, artifact: PreviewArtifact) -> PreviewArtifact {
        match self.inner.collaborators.players.probe_duration(&artifact) {
            Some(duration) => artifact.with_duration(duration),
            None => artifact,
        }
    }

    /// Take the log gate while no session can be writing to the log
    async fn settled(&self, action: &str) -> EngineResult<tokio::sync::MutexGuard<'_, ()>> {
        let gate = self.inner.log_gate.lock().await;
        let status = self.status();
        if !status.accepts_start() {
            return Err(EngineError::Busy(format!("cannot {} while {:?}", action, status)));
        }
        Ok(gate)
    }

    /// Drop the recovery offer
    pub async fn discard_recovery(&self) -> EngineResult<()> {
        let _gate = self.settled("discard recovery").await?;
        tracing::info!("Discarding recoverable recording");
        self.inner.store.clear_log().await;
        Ok(())
    }

    /// Write the preview to `dir` and clear the durable log
    pub async fn save_preview(&self, dir: &Path, name: Option<&str>) -> EngineResult<PathBuf> {
        let _gate = self.settled("save").await?;
        let artifact = self.preview().ok_or(EngineError::NoPreview)?;
        let path = artifact.save(dir, name, false)?;
        self.inner.store.clear_log().await;
        Ok(path)
    }

    /// Drop the preview and clear the durable log
    pub async fn discard_preview(&self) -> EngineResult<()> {
        let _gate = self.settled("discard the preview").await?;
        *self.inner.preview.write() = None;
        self.inner.store.clear_log().await;
        tracing::info!("Preview discarded");
        Ok(())
    }

    /// Re-encode `[start, end]` of the preview and save it. Falls back to
    /// the full recording when playback cannot be captured.
    pub async fn trim_and_save(
        &self,
        start: f64,
        end: f64,
        dir: &Path,
        name: Option<&str>,
    ) -> EngineResult<PathBuf> {
        let artifact = self.preview().ok_or(EngineError::NoPreview)?;
        {
            let mut session = self.inner.session.write();
            if !session.status.accepts_start() {
                return Err(EngineError::Busy(format!(
                    "cannot trim while {:?}",
                    session.status
                )));
            }
            session.reset();
            session.status = RecordingStatus::Processing;
        }
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Processing));

        let template = EncoderConfig {
            mime_type: artifact.mime_type.clone(),
            video_bitrate: self.inner.config.trim_video_bitrate,
            audio_bitrate: self.inner.config.audio.audio_bitrate,
            chunk_interval_ms: self.inner.config.chunk_interval_ms,
            frame_rate: self.settings().frame_rate,
        };
        let pipeline = TrimPipeline::new(
            Arc::clone(&self.inner.collaborators.players),
            Arc::clone(&self.inner.collaborators.encoders),
            template,
        );
        let saved = pipeline
            .run(&artifact, start, end)
            .await
            .and_then(|outcome| outcome.artifact().save(dir, name, outcome.is_trimmed()));
        // Still Processing here, so no session can be writing to the log
        if saved.is_ok() {
            self.inner.store.clear_log().await;
        }

        self.inner.session.write().reset();
        self.emit(RecordingEvent::StatusChanged(RecordingStatus::Idle));
        saved
    }
}

/// Encoders want even dimensions; fall back to the request when the stream
/// has not reported a size yet
fn surface_size(reported: Resolution, requested: Resolution) -> Resolution {
    let size = if reported.width == 0 || reported.height == 0 {
        requested
    } else {
        reported
    };
    Resolution::new((size.width & !1).max(2), (size.height & !1).max(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_size_is_even() {
        let size = surface_size(Resolution::new(1281, 721), Resolution::new(1280, 720));
        assert_eq!(size, Resolution::new(1280, 720));
    }

    #[test]
    fn test_surface_size_falls_back_to_request() {
        let size = surface_size(Resolution::new(0, 0), Resolution::new(1920, 1080));
        assert_eq!(size, Resolution::new(1920, 1080));
    }
}
