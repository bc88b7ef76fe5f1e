//! Trim and re-encode

pub mod pipeline;
pub mod player;

pub use pipeline::{TrimOutcome, TrimPipeline};
pub use player::{PlaybackStream, Player, PlayerFactory};
