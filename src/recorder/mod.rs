//! Recording system module
//!
//! - Session state machine and settings
//! - Scoped session resources with reverse-order release
//! - RecordingCoordinator orchestrating acquisition, countdown, encoding and
//!   finalize

pub mod coordinator;
pub mod resources;
pub mod state;

pub use coordinator::{Collaborators, Preferences, RecordingCoordinator, RecordingEvent};
pub use resources::{Resource, ResourceStack};
pub use state::{RecorderSettings, RecordingMode, RecordingSession, RecordingStatus, VideoQuality};
