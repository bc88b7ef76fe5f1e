//! Session-scoped resources
//!
//! Everything a session acquires goes on one stack and comes off in reverse
//! order, exactly once, on every exit path.

use crate::audio::AudioPump;
use crate::capture::{AudioSource, VideoSource};
use crate::encoder::Encoder;
use crate::render::RenderLoop;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Something that must be released when the session ends
pub trait Resource: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    fn release(&mut self);
}

/// Device video track
pub struct VideoStream {
    name: String,
    source: Arc<dyn VideoSource>,
}

impl VideoStream {
    pub fn new(source: Arc<dyn VideoSource>) -> Self {
        Self {
            name: format!("video:{}", source.label()),
            source,
        }
    }
}

impl Resource for VideoStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) {
        self.source.stop();
    }
}

/// Device audio track
pub struct AudioStream {
    name: String,
    source: Arc<dyn AudioSource>,
}

impl AudioStream {
    pub fn new(source: Arc<dyn AudioSource>) -> Self {
        Self {
            name: format!("audio:{}", source.label()),
            source,
        }
    }
}

impl Resource for AudioStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn release(&mut self) {
        self.source.stop();
    }
}

/// Background task aborted on release
pub struct TaskGuard {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl TaskGuard {
    pub fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
        Self {
            name,
            handle: Some(handle),
        }
    }
}

impl Resource for TaskGuard {
    fn name(&self) -> &str {
        self.name
    }

    fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Live encoder, stopped on release
pub struct EncoderGuard(pub Arc<dyn Encoder>);

impl Resource for EncoderGuard {
    fn name(&self) -> &str {
        "encoder"
    }

    fn release(&mut self) {
        if let Err(e) = self.0.stop() {
            tracing::warn!("Encoder stop failed during release: {}", e);
        }
    }
}

impl Resource for AudioPump {
    fn name(&self) -> &str {
        "audio-graph"
    }

    fn release(&mut self) {
        self.stop();
    }
}

impl Resource for RenderLoop {
    fn name(&self) -> &str {
        "render-loop"
    }

    fn release(&mut self) {
        self.stop();
    }
}

/// Acquisition-ordered resource list
#[derive(Default)]
pub struct ResourceStack {
    entries: Vec<Box<dyn Resource>>,
}

impl ResourceStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resource: impl Resource + 'static) {
        tracing::debug!("Acquired {}", resource.name());
        self.entries.push(Box::new(resource));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release everything, newest first. Idempotent.
    pub fn release_all(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        tracing::debug!("Releasing {} session resources", self.entries.len());
        while let Some(mut resource) = self.entries.pop() {
            tracing::debug!("Releasing {}", resource.name());
            resource.release();
        }
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Resource for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn release(&mut self) {
            self.log.lock().push(self.name);
        }
    }

    fn stack(log: &Arc<Mutex<Vec<&'static str>>>) -> ResourceStack {
        let mut stack = ResourceStack::new();
        for name in ["screen", "microphone", "graph", "render"] {
            stack.push(Probe {
                name,
                log: Arc::clone(log),
            });
        }
        stack
    }

    #[test]
    fn test_release_in_reverse_order_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stack = stack(&log);
        assert_eq!(stack.len(), 4);

        stack.release_all();
        stack.release_all();
        assert!(stack.is_empty());
        assert_eq!(*log.lock(), vec!["render", "graph", "microphone", "screen"]);
    }

    #[test]
    fn test_drop_releases() {
        let log = Arc::new(Mutex::new(Vec::new()));
        drop(stack(&log));
        assert_eq!(log.lock().len(), 4);
    }
}
