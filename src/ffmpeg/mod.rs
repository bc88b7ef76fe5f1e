//! ffmpeg-backed encoder and player
//!
//! Concrete collaborators for hosts that have `ffmpeg` and `ffprobe` on
//! PATH. Both report themselves unsupported when the tools are missing.

pub mod args;
pub mod encoder;
pub mod player;
pub mod probe;

pub use encoder::{FfmpegEncoder, FfmpegEncoderFactory};
pub use player::{FfmpegPlayer, FfmpegPlayerFactory};
pub use probe::{probe_media, tool_available, MediaInfo};
