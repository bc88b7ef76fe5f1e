//! Real-time trim by re-encoding playback
//!
//! The artifact is played from `start` into a fresh encoder and stopped
//! once playback reaches `end`, so a trim takes `end - start` of wall-clock
//! time.

use super::player::{media_duration, Player, PlayerFactory};
use crate::encoder::{EncoderConfig, EncoderEvent, EncoderFactory};
use crate::store::{Chunk, PreviewArtifact, TrimRange};
use crate::utils::error::{EngineError, EngineResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Slack allowed beyond the range length before giving up on playback
const PLAYBACK_GRACE: Duration = Duration::from_secs(10);

/// Time allowed for the encoder to flush after stop
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a trim request
#[derive(Debug, Clone, PartialEq)]
pub enum TrimOutcome {
    /// A new artifact covering only the requested range
    Trimmed(PreviewArtifact),
    /// Playback capture was unavailable; the input is returned as-is
    Untrimmed(PreviewArtifact),
}

impl TrimOutcome {
    pub fn artifact(&self) -> &PreviewArtifact {
        match self {
            TrimOutcome::Trimmed(a) | TrimOutcome::Untrimmed(a) => a,
        }
    }

    pub fn is_trimmed(&self) -> bool {
        matches!(self, TrimOutcome::Trimmed(_))
    }
}

pub struct TrimPipeline {
    players: Arc<dyn PlayerFactory>,
    encoders: Arc<dyn EncoderFactory>,
    /// Encoder settings; the MIME type is taken from the input artifact
    template: EncoderConfig,
}

impl TrimPipeline {
    pub fn new(
        players: Arc<dyn PlayerFactory>,
        encoders: Arc<dyn EncoderFactory>,
        template: EncoderConfig,
    ) -> Self {
        Self {
            players,
            encoders,
            template,
        }
    }

    /// Trim `artifact` to `[start, end]` seconds. The range is checked
    /// against the duration the loaded media reports, or the artifact's
    /// own estimate when nothing could be loaded.
    pub async fn run(
        &self,
        artifact: &PreviewArtifact,
        start: f64,
        end: f64,
    ) -> EngineResult<TrimOutcome> {
        let (player, unsupported) = match self.players.load(artifact) {
            Ok(player) => (Some(player), None),
            Err(EngineError::TrimUnsupported(reason)) => (None, Some(reason)),
            Err(e) => return Err(e),
        };
        let duration = player
            .as_deref()
            .and_then(|player| media_duration(player))
            .unwrap_or(artifact.duration);
        let range = TrimRange::validated(start, end, duration)?;
        tracing::info!(
            "Trimming {:.2}s-{:.2}s of a {:.2}s recording",
            range.start,
            range.end,
            duration
        );

        let result = match player {
            Some(player) => self.reencode(artifact, player.as_ref(), range).await,
            None => Err(EngineError::TrimUnsupported(unsupported.unwrap_or_default())),
        };
        match result {
            Ok(trimmed) => Ok(TrimOutcome::Trimmed(trimmed)),
            Err(EngineError::TrimUnsupported(reason)) => {
                tracing::warn!("Trim unsupported ({}), keeping the full recording", reason);
                Ok(TrimOutcome::Untrimmed(artifact.clone()))
            }
            Err(e) => Err(e),
        }
    }

    async fn reencode(
        &self,
        artifact: &PreviewArtifact,
        player: &dyn Player,
        range: TrimRange,
    ) -> EngineResult<PreviewArtifact> {
        let stream = player.capture_stream().ok_or_else(|| {
            EngineError::TrimUnsupported("playback output cannot be captured".to_string())
        })?;

        let config = EncoderConfig {
            mime_type: artifact.mime_type.clone(),
            ..self.template.clone()
        };
        let encoder = self.encoders.create(config, stream.video, stream.audio)?;
        let (tx, mut rx) = mpsc::unbounded_channel();

        player.seek(range.start)?;
        encoder.start(tx)?;
        if let Err(e) = player.play() {
            let _ = encoder.stop();
            return Err(e);
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut failure: Option<String> = None;
        let frame = Duration::from_secs_f64(1.0 / self.template.frame_rate.max(1) as f64);
        let deadline = Instant::now() + Duration::from_secs_f64(range.length()) + PLAYBACK_GRACE;

        let mut ticker = tokio::time::interval(frame);
        loop {
            ticker.tick().await;
            while let Ok(event) = rx.try_recv() {
                match event {
                    EncoderEvent::Chunk(chunk) => chunks.push(chunk),
                    EncoderEvent::Stopped => {}
                    EncoderEvent::Failed(msg) => failure = Some(msg),
                }
            }
            if failure.is_some() {
                break;
            }
            if player.current_time() >= range.end || player.is_ended() {
                break;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Playback stalled at {:.2}s, ending trim early",
                    player.current_time()
                );
                break;
            }
        }

        player.pause();
        encoder.stop()?;

        if failure.is_none() {
            let flushed = tokio::time::timeout(FLUSH_TIMEOUT, async {
                while let Some(event) = rx.recv().await {
                    match event {
                        EncoderEvent::Chunk(chunk) => chunks.push(chunk),
                        EncoderEvent::Stopped => return None,
                        EncoderEvent::Failed(msg) => return Some(msg),
                    }
                }
                None
            })
            .await;
            match flushed {
                Ok(result) => failure = result,
                Err(_) => tracing::warn!("Encoder did not confirm stop, using chunks so far"),
            }
        }

        if let Some(msg) = failure {
            return Err(EngineError::Encoding(msg));
        }

        let trimmed =
            PreviewArtifact::assemble_or_empty(&chunks, &artifact.mime_type, range.length());
        tracing::info!(
            "Trim produced {} chunks ({} bytes)",
            chunks.len(),
            trimmed.len()
        );
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AudioSource, Resolution, VideoFrame, VideoSource};
    use crate::encoder::{Encoder, EncoderState};
    use crate::trim::player::{PlaybackStream, Player};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Blank;

    impl VideoSource for Blank {
        fn label(&self) -> &str {
            "blank"
        }

        fn dimensions(&self) -> Resolution {
            Resolution::new(2, 2)
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
            Some(Arc::new(VideoFrame::solid(2, 2, [0, 0, 0, 255])))
        }

        fn stop(&self) {}
    }

    struct ClockPlayer {
        capturable: bool,
        offset: Mutex<f64>,
        started: Mutex<Option<Instant>>,
        duration: f64,
    }

    impl Player for ClockPlayer {
        fn duration(&self) -> f64 {
            self.duration
        }

        fn capture_stream(&self) -> Option<PlaybackStream> {
            self.capturable.then(|| PlaybackStream {
                video: Arc::new(Blank),
                audio: None,
            })
        }

        fn seek(&self, seconds: f64) -> EngineResult<()> {
            *self.offset.lock() = seconds;
            Ok(())
        }

        fn play(&self) -> EngineResult<()> {
            *self.started.lock() = Some(Instant::now());
            Ok(())
        }

        fn pause(&self) {}

        fn current_time(&self) -> f64 {
            let played = self
                .started
                .lock()
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0);
            *self.offset.lock() + played
        }

        fn is_ended(&self) -> bool {
            self.current_time() >= self.duration
        }
    }

    struct ClockPlayers {
        capturable: bool,
        /// Length the media reports, when it differs from the estimate
        media_duration: Option<f64>,
    }

    impl PlayerFactory for ClockPlayers {
        fn load(&self, artifact: &PreviewArtifact) -> EngineResult<Box<dyn Player>> {
            Ok(Box::new(ClockPlayer {
                capturable: self.capturable,
                offset: Mutex::new(0.0),
                started: Mutex::new(None),
                duration: self.media_duration.unwrap_or(artifact.duration),
            }))
        }
    }

    /// Emits one byte per tick while running and a final byte on stop
    struct TickEncoder {
        events: Mutex<Option<mpsc::UnboundedSender<EncoderEvent>>>,
        stopped: Arc<AtomicBool>,
    }

    impl Encoder for TickEncoder {
        fn start(&self, events: mpsc::UnboundedSender<EncoderEvent>) -> EngineResult<()> {
            let tx = events.clone();
            let stopped = Arc::clone(&self.stopped);
            tokio::spawn(async move {
                while !stopped.load(Ordering::Relaxed) {
                    let _ = tx.send(EncoderEvent::Chunk(Chunk::new(vec![1], "video/webm")));
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            });
            *self.events.lock() = Some(events);
            Ok(())
        }

        fn pause(&self) -> EngineResult<()> {
            Ok(())
        }

        fn resume(&self) -> EngineResult<()> {
            Ok(())
        }

        fn stop(&self) -> EngineResult<()> {
            self.stopped.store(true, Ordering::Relaxed);
            if let Some(tx) = self.events.lock().take() {
                let _ = tx.send(EncoderEvent::Chunk(Chunk::new(vec![2], "video/webm")));
                let _ = tx.send(EncoderEvent::Stopped);
            }
            Ok(())
        }

        fn state(&self) -> EncoderState {
            EncoderState::Inactive
        }
    }

    struct TickEncoders;

    impl EncoderFactory for TickEncoders {
        fn is_supported(&self, _mime_type: &str) -> bool {
            true
        }

        fn create(
            &self,
            _config: EncoderConfig,
            _video: Arc<dyn VideoSource>,
            _audio: Option<Arc<dyn AudioSource>>,
        ) -> EngineResult<Box<dyn Encoder>> {
            Ok(Box::new(TickEncoder {
                events: Mutex::new(None),
                stopped: Arc::new(AtomicBool::new(false)),
            }))
        }
    }

    fn pipeline(capturable: bool) -> TrimPipeline {
        pipeline_with(ClockPlayers {
            capturable,
            media_duration: None,
        })
    }

    fn pipeline_with(players: ClockPlayers) -> TrimPipeline {
        TrimPipeline::new(
            Arc::new(players),
            Arc::new(TickEncoders),
            EncoderConfig {
                mime_type: String::new(),
                video_bitrate: 8_000_000,
                audio_bitrate: 320_000,
                chunk_interval_ms: 20,
                frame_rate: 60,
            },
        )
    }

    fn artifact(duration: f64) -> PreviewArtifact {
        PreviewArtifact::assemble(&[Chunk::new(vec![0; 64], "video/webm")], Duration::ZERO)
            .unwrap()
            .with_duration(duration)
    }

    #[tokio::test]
    async fn test_trim_produces_range_artifact() {
        let outcome = pipeline(true).run(&artifact(5.0), 1.0, 1.2).await.unwrap();
        assert!(outcome.is_trimmed());
        let trimmed = outcome.artifact();
        assert!((trimmed.duration - 0.2).abs() < 1e-9);
        assert!(trimmed.len() >= 2);
        assert!(trimmed.data.contains(&2));
    }

    #[tokio::test]
    async fn test_zero_length_trim_is_near_empty() {
        let outcome = pipeline(true).run(&artifact(5.0), 3.0, 3.0).await.unwrap();
        assert!(outcome.is_trimmed());
        assert_eq!(outcome.artifact().duration, 0.0);
        assert!(outcome.artifact().len() <= 3);
    }

    #[tokio::test]
    async fn test_uncapturable_playback_falls_back_to_full_artifact() {
        let original = artifact(5.0);
        let outcome = pipeline(false).run(&original, 1.0, 2.0).await.unwrap();
        assert!(!outcome.is_trimmed());
        assert_eq!(outcome.artifact(), &original);
    }

    #[tokio::test]
    async fn test_range_is_checked_against_media_duration() {
        // Chunk-count estimate says 1s, the media is 5s long
        let players = ClockPlayers {
            capturable: true,
            media_duration: Some(5.0),
        };
        let outcome = pipeline_with(players)
            .run(&artifact(1.0), 2.0, 2.2)
            .await
            .unwrap();
        assert!(outcome.is_trimmed());
        assert!((outcome.artifact().duration - 0.2).abs() < 1e-9);

        let players = ClockPlayers {
            capturable: true,
            media_duration: Some(5.0),
        };
        let err = pipeline_with(players)
            .run(&artifact(1.0), 4.0, 3.0)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTrimRange { duration, .. } if duration == 5.0));
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let err = pipeline(true).run(&artifact(5.0), 3.0, 2.0).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTrimRange { .. }));
    }
}
