//! Audio mixing
//!
//! Builds the per-session mix graph, drives it on a fixed quantum clock and
//! exposes the mixed output track plus the microphone analysis tap.

pub mod analyser;
pub mod graph;
pub mod track;

pub use analyser::{Analyser, FrequencySnapshot, SharedAnalyser};
pub use graph::{GainControl, GraphNode, MixGraph, MixInputs, SourceKind};
pub use track::{AudioPump, MixedTrack, SharedGraph};
