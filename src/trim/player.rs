//! Playback element used to re-capture a sub-range of an artifact

use crate::capture::{AudioSource, VideoSource};
use crate::store::PreviewArtifact;
use crate::utils::error::EngineResult;
use std::sync::Arc;

/// Live output of a playing artifact
pub struct PlaybackStream {
    pub video: Arc<dyn VideoSource>,
    pub audio: Option<Arc<dyn AudioSource>>,
}

/// A loaded artifact that can be seeked and played in real time
pub trait Player: Send + Sync {
    /// Duration reported by the media itself, in seconds
    fn duration(&self) -> f64;

    /// Live output of playback. None when the platform cannot expose it.
    fn capture_stream(&self) -> Option<PlaybackStream>;

    fn seek(&self, seconds: f64) -> EngineResult<()>;

    fn play(&self) -> EngineResult<()>;

    fn pause(&self);

    /// Current playback position in seconds
    fn current_time(&self) -> f64;

    fn is_ended(&self) -> bool;
}

/// Loads artifacts into players
pub trait PlayerFactory: Send + Sync {
    /// Fails with `TrimUnsupported` when playback capture is unavailable
    fn load(&self, artifact: &PreviewArtifact) -> EngineResult<Box<dyn Player>>;

    /// Duration the media reports for `artifact`, None when it cannot be read
    fn probe_duration(&self, artifact: &PreviewArtifact) -> Option<f64> {
        let player = self.load(artifact).ok()?;
        media_duration(player.as_ref())
    }
}

/// The player's duration when it is a usable length
pub fn media_duration(player: &dyn Player) -> Option<f64> {
    let duration = player.duration();
    (duration.is_finite() && duration > 0.0).then_some(duration)
}
