//! Capture acquisition interfaces
//!
//! The engine never talks to devices directly; it receives stream handles
//! from a [`CaptureProvider`] supplied by the host.

pub mod traits;

pub use traits::{
    AudioBlock, AudioFormat, AudioSource, CaptureProvider, Resolution, ScreenCapture,
    ScreenRequest, VideoFrame, VideoSource,
};
