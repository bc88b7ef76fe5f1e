//! Studio Recorder - the recording engine behind a studio-style screen recorder.
//!
//! Captures a display with optional microphone, system audio and webcam,
//! composites them live with annotations and overlays, mixes the audio,
//! persists encoded chunks for crash recovery and trims finished recordings.
//! Device access and encoding are supplied by the host through the traits in
//! [`capture`], [`encoder`] and [`trim`]; [`ffmpeg`] provides ready-made
//! encoder and player implementations.

pub mod audio;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod ffmpeg;
pub mod recorder;
pub mod render;
pub mod store;
pub mod trim;
pub mod utils;

pub use config::EngineConfig;
pub use recorder::{Collaborators, RecorderSettings, RecordingCoordinator, RecordingEvent, RecordingStatus};
pub use utils::error::{EngineError, EngineResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Studio Recorder v{}", env!("CARGO_PKG_VERSION"));
}
