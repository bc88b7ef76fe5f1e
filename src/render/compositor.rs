//! Frame compositor
//!
//! Draws one output frame from the screen, the webcam and the composite
//! state. Layers go strictly bottom to top: background, screen, watermark,
//! ripples, annotations, webcam.

use super::raster::{self, Circle, Rect};
use super::state::{Color, CompositeState, Point};
use crate::capture::{Resolution, VideoFrame, VideoSource};
use crate::config::RenderConfig;

/// Stateless drawer for a fixed surface size
#[derive(Debug, Clone)]
pub struct Compositor {
    surface: Resolution,
    config: RenderConfig,
    background: Color,
}

impl Compositor {
    pub fn new(surface: Resolution, config: RenderConfig) -> Self {
        Self {
            surface,
            config,
            background: Color::BLACK,
        }
    }

    pub fn surface(&self) -> Resolution {
        self.surface
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Compose one frame. Returns None, leaving ripples untouched, when the
    /// screen has nothing to draw yet.
    pub fn render(
        &self,
        state: &mut CompositeState,
        screen: &dyn VideoSource,
        webcam: Option<&dyn VideoSource>,
    ) -> Option<VideoFrame> {
        if !screen.is_ready() {
            return None;
        }
        let screen_frame = screen.latest_frame()?;

        let mut frame = VideoFrame {
            width: self.surface.width,
            height: self.surface.height,
            data: vec![0; self.surface.width as usize * self.surface.height as usize * 4],
        };

        raster::fill(&mut frame, self.background);
        self.draw_screen(&mut frame, &screen_frame);
        self.draw_watermark(&mut frame, state);
        self.draw_ripples(&mut frame, state);
        self.draw_annotations(&mut frame, state);
        if let Some(webcam) = webcam {
            self.draw_webcam(&mut frame, state, webcam);
        }

        Some(frame)
    }

    fn draw_screen(&self, frame: &mut VideoFrame, screen: &VideoFrame) {
        let source = Resolution::new(screen.width, screen.height);
        let dst = raster::fit_rect(source, self.surface);
        let src = Rect::new(0.0, 0.0, screen.width as f64, screen.height as f64);
        raster::draw_image(frame, screen, src, dst, 1.0, None);
    }

    fn draw_watermark(&self, frame: &mut VideoFrame, state: &CompositeState) {
        let Some(image) = state.watermark.as_ref() else {
            return;
        };
        if image.width == 0 || image.height == 0 {
            return;
        }

        let width = self.config.watermark_width as f64;
        let height = width * image.height as f64 / image.width as f64;
        let margin = self.config.watermark_margin as f64;
        let dst = Rect::new(
            self.surface.width as f64 - width - margin,
            self.surface.height as f64 - height - margin,
            width,
            height,
        );
        let src = Rect::new(0.0, 0.0, image.width as f64, image.height as f64);
        raster::draw_image(frame, image, src, dst, self.config.watermark_opacity, None);
    }

    /// Draw each ripple at its current alpha, then age it
    fn draw_ripples(&self, frame: &mut VideoFrame, state: &mut CompositeState) {
        for ripple in state.ripples.iter_mut() {
            raster::stroke_ring(
                frame,
                Point::new(ripple.x, ripple.y),
                ripple.radius,
                self.config.ripple_line_width,
                Color::AMBER,
                ripple.alpha,
            );
            ripple.advance(self.config.ripple_radius_step, self.config.ripple_alpha_step);
        }
        state.ripples.retain(|r| !r.is_expired());
    }

    fn draw_annotations(&self, frame: &mut VideoFrame, state: &CompositeState) {
        for stroke in state.annotations.iter().chain(state.in_progress.iter()) {
            raster::stroke_polyline(frame, &stroke.points, stroke.width, stroke.color);
        }
    }

    fn draw_webcam(&self, frame: &mut VideoFrame, state: &CompositeState, webcam: &dyn VideoSource) {
        if !state.webcam.active || !webcam.is_ready() {
            return;
        }
        let Some(cam) = webcam.latest_frame() else {
            return;
        };

        let overlay = state.webcam;
        let src = raster::center_square(Resolution::new(cam.width, cam.height));
        let dst = Rect::new(overlay.x, overlay.y, overlay.diameter, overlay.diameter);
        let clip = Circle {
            center: overlay.center(),
            radius: overlay.radius(),
        };
        raster::draw_image(frame, &cam, src, dst, 1.0, Some(clip));
        raster::stroke_ring(
            frame,
            overlay.center(),
            overlay.radius(),
            self.config.webcam_border_width,
            Color::WHITE,
            1.0,
        );
    }
}
