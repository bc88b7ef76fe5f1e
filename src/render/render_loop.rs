//! Continuous redraw loop and its output surface

use super::compositor::Compositor;
use super::input::{apply_input, InputQueue};
use super::state::SharedComposite;
use crate::capture::{Resolution, VideoFrame, VideoSource};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The composited output, consumable like any live video stream
pub struct FrameSurface {
    size: Resolution,
    frame: RwLock<Option<Arc<VideoFrame>>>,
    frames_rendered: AtomicU64,
    stopped: AtomicBool,
}

impl FrameSurface {
    pub fn new(size: Resolution) -> Arc<Self> {
        Arc::new(Self {
            size,
            frame: RwLock::new(None),
            frames_rendered: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn publish(&self, frame: VideoFrame) {
        if self.stopped.load(Ordering::Relaxed) {
            return;
        }
        *self.frame.write() = Some(Arc::new(frame));
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }
}

impl VideoSource for FrameSurface {
    fn label(&self) -> &str {
        "composite-surface"
    }

    fn dimensions(&self) -> Resolution {
        self.size
    }

    fn is_ready(&self) -> bool {
        self.frame.read().is_some()
    }

    fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.frame.read().clone()
    }

    fn is_ended(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

/// Sources the loop draws from
pub struct RenderInputs {
    pub screen: Arc<dyn VideoSource>,
    pub webcam: Option<Arc<dyn VideoSource>>,
    pub state: SharedComposite,
    pub input: InputQueue,
}

/// Handle to the running redraw task
pub struct RenderLoop {
    handle: Option<JoinHandle<()>>,
    surface: Arc<FrameSurface>,
}

impl RenderLoop {
    /// Spawn the loop at `frame_rate` frames per second
    pub fn spawn(compositor: Compositor, inputs: RenderInputs, frame_rate: u32) -> Self {
        let surface = FrameSurface::new(compositor.surface());
        let task_surface = Arc::clone(&surface);
        let period = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);

        tracing::info!(
            "Starting render loop at {}x{} @ {} fps",
            compositor.surface().width,
            compositor.surface().height,
            frame_rate
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let events = inputs.input.drain();
                let frame = {
                    let mut state = inputs.state.lock();
                    for event in events {
                        apply_input(&mut state, event, compositor.config());
                    }
                    compositor.render(&mut state, inputs.screen.as_ref(), inputs.webcam.as_deref())
                };
                if let Some(frame) = frame {
                    task_surface.publish(frame);
                }
            }
        });

        Self {
            handle: Some(handle),
            surface,
        }
    }

    pub fn surface(&self) -> Arc<FrameSurface> {
        Arc::clone(&self.surface)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Cancel the loop and end the surface. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("Render loop stopped");
        }
        self.surface.stop();
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::render::input::InputEvent;
    use crate::render::state::{CompositeState, Point};

    struct Screen(Arc<VideoFrame>);

    impl VideoSource for Screen {
        fn label(&self) -> &str {
            "screen"
        }

        fn dimensions(&self) -> Resolution {
            Resolution::new(self.0.width, self.0.height)
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
            Some(Arc::clone(&self.0))
        }

        fn stop(&self) {}
    }

    #[tokio::test]
    async fn test_loop_publishes_frames_and_drains_input() {
        let config = RenderConfig::default();
        let state = CompositeState::shared(&config);
        let input = InputQueue::new();
        let size = Resolution::new(64, 48);
        let inputs = RenderInputs {
            screen: Arc::new(Screen(Arc::new(VideoFrame::solid(64, 48, [9, 9, 9, 255])))),
            webcam: None,
            state: Arc::clone(&state),
            input: input.clone(),
        };

        let mut render = RenderLoop::spawn(Compositor::new(size, config), inputs, 60);
        let surface = render.surface();
        state.lock().drawing_mode = true;
        input.push(InputEvent::down(Point::new(1.0, 1.0)));
        input.push(InputEvent::moved(Point::new(8.0, 8.0)));
        input.push(InputEvent::PointerUp);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(surface.is_ready());
        assert!(surface.frames_rendered() > 0);
        assert_eq!(surface.dimensions(), size);
        assert_eq!(state.lock().annotations.len(), 1);

        render.stop();
        render.stop();
        assert!(surface.is_ended());
        assert!(!render.is_running());
    }
}
