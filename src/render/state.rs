//! Composite state
//!
//! Everything the user can change on the live surface during a session:
//! webcam placement, annotation strokes, ripples, watermark and brush.

use crate::capture::{Resolution, VideoFrame};
use crate::config::RenderConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Composite state shared by the render loop and the engine's intents
pub type SharedComposite = Arc<Mutex<CompositeState>>;

/// A point in surface pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    /// Ripple ring color
    pub const AMBER: Color = Color::rgb(250, 204, 21);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse `#rgb` or `#rrggbb`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let parse = |s: &str| u8::from_str_radix(s, 16).ok();
        match digits.len() {
            6 => Some(Self::rgb(
                parse(&digits[0..2])?,
                parse(&digits[2..4])?,
                parse(&digits[4..6])?,
            )),
            3 => {
                let expand = |c: &str| parse(c).map(|v| v * 17);
                Some(Self::rgb(
                    expand(&digits[0..1])?,
                    expand(&digits[1..2])?,
                    expand(&digits[2..3])?,
                ))
            }
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// One annotation polyline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub color: Color,
    pub width: f64,
}

/// Decaying click marker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ripple {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub alpha: f32,
}

impl Ripple {
    pub fn new(at: Point, radius: f64) -> Self {
        Self {
            x: at.x,
            y: at.y,
            radius,
            alpha: 1.0,
        }
    }

    /// Advance one frame of decay
    pub fn advance(&mut self, radius_step: f64, alpha_step: f32) {
        self.radius += radius_step;
        self.alpha -= alpha_step;
    }

    pub fn is_expired(&self) -> bool {
        self.alpha <= 0.0
    }
}

/// Circular webcam overlay placement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WebcamOverlay {
    pub active: bool,
    /// Top-left of the bounding square
    pub x: f64,
    pub y: f64,
    pub diameter: f64,
}

impl WebcamOverlay {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.diameter / 2.0, self.y + self.diameter / 2.0)
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// Whether `p` falls strictly inside the circle
    pub fn contains(&self, p: Point) -> bool {
        let c = self.center();
        let (dx, dy) = (p.x - c.x, p.y - c.y);
        dx * dx + dy * dy < self.radius() * self.radius()
    }
}

/// Everything layered on top of the screen
#[derive(Debug, Clone)]
pub struct CompositeState {
    pub webcam: WebcamOverlay,
    pub annotations: Vec<Stroke>,
    pub in_progress: Option<Stroke>,
    pub ripples: Vec<Ripple>,
    pub watermark: Option<Arc<VideoFrame>>,
    pub drawing_mode: bool,
    pub brush_color: Color,
    pub brush_width: f64,
    /// Pointer offset inside the webcam square while dragging
    pub(crate) drag_offset: Option<Point>,
}

impl CompositeState {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            webcam: WebcamOverlay {
                active: false,
                x: 50.0,
                y: 50.0,
                diameter: config.webcam_diameter,
            },
            annotations: Vec::new(),
            in_progress: None,
            ripples: Vec::new(),
            watermark: None,
            drawing_mode: false,
            brush_color: Color::from_hex(&config.default_brush_color).unwrap_or(Color::WHITE),
            brush_width: config.brush_width,
            drag_offset: None,
        }
    }

    pub fn shared(config: &RenderConfig) -> SharedComposite {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// Clear per-session marks and place the webcam for a new surface.
    /// User preferences (webcam toggle, drawing mode, brush, watermark) survive.
    pub fn reset_for_session(&mut self, surface: Resolution, config: &RenderConfig) {
        self.annotations.clear();
        self.in_progress = None;
        self.ripples.clear();
        self.drag_offset = None;
        self.webcam.diameter = config.webcam_diameter;
        self.webcam.x = (surface.width as f64 - config.webcam_right_offset).max(0.0);
        self.webcam.y = config.webcam_top;
    }

    /// Drop every committed stroke
    pub fn clear_annotations(&mut self) {
        self.annotations.clear();
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_offset.is_some()
    }
}
