//! Audio mix graph
//!
//! Routes each connected source through its own gain into a single summation
//! point that feeds the mixed output track:
//!
//! ```text
//! microphone  -> gain -> +-> analyser
//!                        |
//!                        v
//! system audio -> gain -> sum -> [delay, studio only] -> destination
//! ```
//!
//! Muting only rewrites a gain value. The set of nodes never changes after
//! the graph is built, so a mute toggle cannot cause a stream renegotiation.

use super::analyser::{Analyser, SharedAnalyser};
use crate::capture::{AudioBlock, AudioFormat, AudioSource};
use crate::config::AudioConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// FFT size of the microphone analysis tap
const ANALYSER_FFT_SIZE: usize = 256;

/// Kind of audio source feeding the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Microphone,
    SystemAudio,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Microphone => write!(f, "microphone"),
            SourceKind::SystemAudio => write!(f, "system-audio"),
        }
    }
}

/// Node in the graph topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphNode {
    Source(SourceKind),
    Gain(SourceKind),
    Analyser,
    Delay,
    Destination,
}

/// Live gain value shared between the graph and its controllers
#[derive(Debug, Clone)]
pub struct GainControl(Arc<AtomicU32>);

impl GainControl {
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_muted(&self, muted: bool) {
        self.set(if muted { 0.0 } else { 1.0 });
    }

    pub fn is_muted(&self) -> bool {
        self.value() == 0.0
    }
}

/// One source routed through its gain
struct AudioRoute {
    kind: SourceKind,
    source: Arc<dyn AudioSource>,
    gain: GainControl,
    pending: VecDeque<f32>,
}

/// Fixed-length delay line over interleaved samples
struct DelayLine {
    buffer: VecDeque<f32>,
}

impl DelayLine {
    fn new(delay_samples: usize) -> Self {
        Self {
            buffer: VecDeque::from(vec![0.0; delay_samples]),
        }
    }

    fn process(&mut self, samples: &mut [f32]) {
        if self.buffer.is_empty() {
            return;
        }
        for sample in samples.iter_mut() {
            self.buffer.push_back(*sample);
            *sample = self.buffer.pop_front().unwrap_or(0.0);
        }
    }
}

/// Inputs used to build a graph
#[derive(Default)]
pub struct MixInputs {
    pub microphone: Option<Arc<dyn AudioSource>>,
    pub system_audio: Option<Arc<dyn AudioSource>>,
    /// Composited recording: insert the lip-sync delay
    pub studio: bool,
    pub microphone_muted: bool,
    pub system_audio_muted: bool,
}

/// The mix graph for one session
pub struct MixGraph {
    format: AudioFormat,
    quantum_frames: usize,
    max_pending_samples: usize,
    routes: Vec<AudioRoute>,
    delay: Option<DelayLine>,
    analyser: Option<SharedAnalyser>,
    closed: bool,
}

impl MixGraph {
    /// Build the graph for the given inputs
    pub fn build(inputs: MixInputs, config: &AudioConfig) -> Self {
        let format = config.format;
        let channels = format.channels as usize;
        let mut routes = Vec::new();
        let mut analyser = None;

        // System audio is connected first, like the capture order
        if let Some(source) = inputs.system_audio {
            tracing::info!("Connecting system audio route: {}", source.label());
            routes.push(AudioRoute {
                kind: SourceKind::SystemAudio,
                source,
                gain: GainControl::new(if inputs.system_audio_muted { 0.0 } else { 1.0 }),
                pending: VecDeque::new(),
            });
        }

        if let Some(source) = inputs.microphone {
            tracing::info!("Connecting microphone route: {}", source.label());
            routes.push(AudioRoute {
                kind: SourceKind::Microphone,
                source,
                gain: GainControl::new(if inputs.microphone_muted { 0.0 } else { 1.0 }),
                pending: VecDeque::new(),
            });
            analyser = Some(Analyser::shared(ANALYSER_FFT_SIZE));
        }

        let delay = if inputs.studio && !routes.is_empty() && config.studio_delay_ms > 0 {
            let samples = format.frames_for_ms(config.studio_delay_ms) * channels;
            tracing::debug!(
                "Studio mode: delaying mix by {}ms ({} samples)",
                config.studio_delay_ms,
                samples
            );
            Some(DelayLine::new(samples))
        } else {
            None
        };

        if routes.is_empty() {
            tracing::info!("No audio sources connected, recording will be silent");
        }

        Self {
            format,
            quantum_frames: format.frames_for_ms(config.quantum_ms).max(1),
            max_pending_samples: format.frames_for_ms(config.max_buffer_ms) * channels,
            routes,
            delay,
            analyser,
            closed: false,
        }
    }

    /// Whether the graph produces an output track at all
    pub fn has_output(&self) -> bool {
        !self.routes.is_empty()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Current topology, sources first, destination last
    pub fn nodes(&self) -> Vec<GraphNode> {
        let mut nodes = Vec::new();
        for route in &self.routes {
            nodes.push(GraphNode::Source(route.kind));
            nodes.push(GraphNode::Gain(route.kind));
        }
        if self.analyser.is_some() {
            nodes.push(GraphNode::Analyser);
        }
        if self.delay.is_some() {
            nodes.push(GraphNode::Delay);
        }
        if self.has_output() {
            nodes.push(GraphNode::Destination);
        }
        nodes
    }

    /// Gain handle for a route, None when that source is not connected
    pub fn gain(&self, kind: SourceKind) -> Option<GainControl> {
        self.routes
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.gain.clone())
    }

    /// Mute or unmute a route in place. Returns false when not connected.
    pub fn set_muted(&self, kind: SourceKind, muted: bool) -> bool {
        match self.gain(kind) {
            Some(gain) => {
                gain.set_muted(muted);
                tracing::debug!("{} gain set to {}", kind, gain.value());
                true
            }
            None => false,
        }
    }

    /// Post-gain microphone analyser
    pub fn analyser(&self) -> Option<SharedAnalyser> {
        self.analyser.clone()
    }

    /// Produce one quantum of mixed output
    ///
    /// Input that has not arrived yet is treated as silence; the output clock
    /// never stalls on a slow source.
    pub fn render_quantum(&mut self) -> Option<AudioBlock> {
        if self.closed || self.routes.is_empty() {
            return None;
        }

        let channels = self.format.channels;
        let samples_needed = self.quantum_frames * channels as usize;
        let mut mix = vec![0.0f32; samples_needed];

        for route in &mut self.routes {
            Self::pull_pending(route, self.format, self.max_pending_samples);

            let gain = route.gain.value();
            let take = samples_needed.min(route.pending.len());
            let mut branch: Vec<f32> = route.pending.drain(..take).map(|s| s * gain).collect();
            branch.resize(samples_needed, 0.0);

            if route.kind == SourceKind::Microphone {
                if let Some(analyser) = &self.analyser {
                    analyser.lock().push_interleaved(&branch, channels);
                }
            }

            for (out, sample) in mix.iter_mut().zip(&branch) {
                *out += sample;
            }
        }

        if let Some(delay) = &mut self.delay {
            delay.process(&mut mix);
        }

        for sample in mix.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        Some(AudioBlock::new(mix, self.format))
    }

    /// Move every available block from a source into its pending buffer
    fn pull_pending(route: &mut AudioRoute, format: AudioFormat, max_pending: usize) {
        while let Some(block) = route.source.read() {
            if block.format != format {
                tracing::warn!(
                    "Dropping {} block with format {:?}, expected {:?}",
                    route.kind,
                    block.format,
                    format
                );
                continue;
            }
            route.pending.extend(block.samples);
        }

        if route.pending.len() > max_pending {
            let overflow = route.pending.len() - max_pending;
            tracing::warn!("Dropping {} stale {} samples", overflow, route.kind);
            route.pending.drain(..overflow);
        }
    }

    /// Disconnect every route. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for route in &mut self.routes {
            route.pending.clear();
        }
        tracing::debug!("Audio graph closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
