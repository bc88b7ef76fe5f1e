//! Pointer input on the preview surface
//!
//! Events are queued by the caller and applied by the render loop once per
//! frame, so composite state only ever changes on the render tick.

use super::state::{CompositeState, Point, Ripple, Stroke};
use crate::capture::Resolution;
use crate::config::RenderConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Pointer event in surface coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputEvent {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp,
}

impl InputEvent {
    pub fn down(p: Point) -> Self {
        Self::PointerDown { x: p.x, y: p.y }
    }

    pub fn moved(p: Point) -> Self {
        Self::PointerMove { x: p.x, y: p.y }
    }
}

/// Cloneable queue of pending pointer events
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    events: Arc<Mutex<VecDeque<InputEvent>>>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: InputEvent) {
        self.events.lock().push_back(event);
    }

    /// Take every queued event in arrival order
    pub fn drain(&self) -> Vec<InputEvent> {
        self.events.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Map a point on a displayed view of `view_width` x `view_height` into
/// surface pixels, compensating for display scaling
pub fn map_view_point(view: Point, view_width: f64, view_height: f64, surface: Resolution) -> Point {
    if view_width <= 0.0 || view_height <= 0.0 {
        return view;
    }
    Point::new(
        view.x * surface.width as f64 / view_width,
        view.y * surface.height as f64 / view_height,
    )
}

/// Apply one pointer event to the composite state
pub fn apply_input(state: &mut CompositeState, event: InputEvent, config: &RenderConfig) {
    match event {
        InputEvent::PointerDown { x, y } => {
            let p = Point::new(x, y);
            state.ripples.push(Ripple::new(p, config.ripple_initial_radius));

            if state.webcam.active && state.webcam.contains(p) {
                state.drag_offset = Some(Point::new(x - state.webcam.x, y - state.webcam.y));
                return;
            }

            if state.drawing_mode {
                state.in_progress = Some(Stroke {
                    points: vec![p],
                    color: state.brush_color,
                    width: state.brush_width,
                });
            }
        }
        InputEvent::PointerMove { x, y } => {
            if let Some(offset) = state.drag_offset {
                state.webcam.x = x - offset.x;
                state.webcam.y = y - offset.y;
                return;
            }
            if state.drawing_mode {
                if let Some(stroke) = state.in_progress.as_mut() {
                    stroke.points.push(Point::new(x, y));
                }
            }
        }
        InputEvent::PointerUp => {
            state.drag_offset = None;
            if let Some(stroke) = state.in_progress.take() {
                state.annotations.push(stroke);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_webcam() -> (CompositeState, RenderConfig) {
        let config = RenderConfig::default();
        let mut state = CompositeState::new(&config);
        state.reset_for_session(Resolution::new(1280, 720), &config);
        state.webcam.active = true;
        (state, config)
    }

    #[test]
    fn test_press_inside_webcam_drags_it() {
        let (mut state, config) = state_with_webcam();
        // Webcam sits at (980, 50) with diameter 200
        apply_input(&mut state, InputEvent::down(Point::new(1080.0, 150.0)), &config);
        assert!(state.is_dragging());
        assert_eq!(state.ripples.len(), 1);

        apply_input(&mut state, InputEvent::moved(Point::new(600.0, 400.0)), &config);
        assert_eq!(state.webcam.x, 500.0);
        assert_eq!(state.webcam.y, 300.0);

        apply_input(&mut state, InputEvent::PointerUp, &config);
        assert!(!state.is_dragging());
        assert!(state.annotations.is_empty());
    }

    #[test]
    fn test_drag_takes_priority_over_drawing() {
        let (mut state, config) = state_with_webcam();
        state.drawing_mode = true;
        apply_input(&mut state, InputEvent::down(Point::new(1080.0, 150.0)), &config);
        assert!(state.in_progress.is_none());
    }

    #[test]
    fn test_drawing_commits_stroke_on_release() {
        let (mut state, config) = state_with_webcam();
        state.drawing_mode = true;

        apply_input(&mut state, InputEvent::down(Point::new(10.0, 10.0)), &config);
        apply_input(&mut state, InputEvent::moved(Point::new(20.0, 20.0)), &config);
        apply_input(&mut state, InputEvent::moved(Point::new(30.0, 25.0)), &config);
        apply_input(&mut state, InputEvent::PointerUp, &config);

        assert_eq!(state.annotations.len(), 1);
        let stroke = &state.annotations[0];
        assert_eq!(stroke.points.len(), 3);
        assert_eq!(stroke.color.to_hex(), "#ef4444");
        assert_eq!(stroke.width, 5.0);
    }

    #[test]
    fn test_press_outside_modes_only_ripples() {
        let (mut state, config) = state_with_webcam();
        apply_input(&mut state, InputEvent::down(Point::new(10.0, 10.0)), &config);
        apply_input(&mut state, InputEvent::PointerUp, &config);
        assert_eq!(state.ripples.len(), 1);
        assert_eq!(state.ripples[0].radius, 10.0);
        assert!(state.annotations.is_empty());
    }

    #[test]
    fn test_map_view_point_scales_to_surface() {
        let p = map_view_point(Point::new(320.0, 180.0), 640.0, 360.0, Resolution::new(1920, 1080));
        assert_eq!(p, Point::new(960.0, 540.0));
    }

    #[test]
    fn test_queue_drains_in_order() {
        let queue = InputQueue::new();
        queue.push(InputEvent::down(Point::new(1.0, 1.0)));
        queue.push(InputEvent::PointerUp);
        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], InputEvent::PointerUp);
        assert!(queue.drain().is_empty());
    }
}
