//! Mixed output track and the clock that drives the graph

use super::graph::MixGraph;
use crate::capture::{AudioBlock, AudioSource};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Graph shared between the pump task and mute controls
pub type SharedGraph = Arc<Mutex<MixGraph>>;

/// The graph's destination, readable by the encoder as a live audio track
///
/// Like a live media track it does not hoard history: when nobody reads,
/// only the newest `capacity` blocks are kept.
pub struct MixedTrack {
    queue: Mutex<VecDeque<AudioBlock>>,
    capacity: usize,
    stopped: AtomicBool,
}

impl MixedTrack {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn push(&self, block: AudioBlock) {
        if self.stopped.load(Ordering::Relaxed) {
            return;
        }
        let mut queue = self.queue.lock();
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(block);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

impl AudioSource for MixedTrack {
    fn label(&self) -> &str {
        "mixed-output"
    }

    fn read(&self) -> Option<AudioBlock> {
        self.queue.lock().pop_front()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.queue.lock().clear();
    }
}

/// Periodic task pulling quanta out of the graph into the mixed track
pub struct AudioPump {
    handle: Option<JoinHandle<()>>,
    graph: SharedGraph,
    track: Option<Arc<MixedTrack>>,
}

impl AudioPump {
    /// Start driving `graph` every `quantum`. No task is spawned for a graph
    /// without output.
    pub fn spawn(graph: SharedGraph, quantum: Duration, max_buffer: Duration) -> Self {
        if !graph.lock().has_output() {
            return Self {
                handle: None,
                graph,
                track: None,
            };
        }

        let capacity = (max_buffer.as_millis() / quantum.as_millis().max(1)) as usize;
        let track = MixedTrack::new(capacity);
        let task_graph = Arc::clone(&graph);
        let task_track = Arc::clone(&track);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(quantum);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                ticker.tick().await;
                let block = task_graph.lock().render_quantum();
                match block {
                    Some(block) => task_track.push(block),
                    None => break,
                }
            }
            tracing::debug!("Audio pump finished");
        });

        Self {
            handle: Some(handle),
            graph,
            track: Some(track),
        }
    }

    /// The mixed output track, None for a silent recording
    pub fn track(&self) -> Option<Arc<MixedTrack>> {
        self.track.clone()
    }

    pub fn graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    /// Stop the clock and close the graph. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        if let Some(track) = &self.track {
            track.stop();
        }
        self.graph.lock().close();
    }
}

impl Drop for AudioPump {
    fn drop(&mut self) {
        self.stop();
    }
}
