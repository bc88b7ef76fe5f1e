//! Software rasterizer for RGBA frames
//!
//! Nearest-neighbor scaling and straight alpha blending, enough for the
//! handful of layers the compositor draws.

use super::state::{Color, Point};
use crate::capture::{Resolution, VideoFrame};

/// Axis-aligned rectangle in pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Circle used to clip a blit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

/// Largest rectangle of `source`'s aspect ratio that fits inside `target`,
/// centered
pub fn fit_rect(source: Resolution, target: Resolution) -> Rect {
    if source.width == 0 || source.height == 0 {
        return Rect::new(0.0, 0.0, 0.0, 0.0);
    }
    let scale = (target.width as f64 / source.width as f64)
        .min(target.height as f64 / source.height as f64);
    let width = source.width as f64 * scale;
    let height = source.height as f64 * scale;
    Rect::new(
        (target.width as f64 - width) / 2.0,
        (target.height as f64 - height) / 2.0,
        width,
        height,
    )
}

/// Centered square crop of `source`
pub fn center_square(source: Resolution) -> Rect {
    let side = source.width.min(source.height) as f64;
    Rect::new(
        (source.width as f64 - side) / 2.0,
        (source.height as f64 - side) / 2.0,
        side,
        side,
    )
}

/// Fill the whole frame with one opaque color
pub fn fill(frame: &mut VideoFrame, color: Color) {
    for px in frame.data.chunks_exact_mut(4) {
        px[0] = color.r;
        px[1] = color.g;
        px[2] = color.b;
        px[3] = 255;
    }
}

/// Blend `color` over one pixel with coverage `alpha` (0.0-1.0)
#[inline]
pub fn blend_pixel(frame: &mut VideoFrame, x: i64, y: i64, color: Color, alpha: f32) {
    if x < 0 || y < 0 || x >= frame.width as i64 || y >= frame.height as i64 {
        return;
    }
    let a = (alpha * color.a as f32 / 255.0).clamp(0.0, 1.0);
    if a < 0.004 {
        return;
    }
    let idx = ((y as usize * frame.width as usize) + x as usize) * 4;
    let Some(px) = frame.data.get_mut(idx..idx + 4) else {
        return;
    };
    px[0] = (color.r as f32 * a + px[0] as f32 * (1.0 - a)).clamp(0.0, 255.0) as u8;
    px[1] = (color.g as f32 * a + px[1] as f32 * (1.0 - a)).clamp(0.0, 255.0) as u8;
    px[2] = (color.b as f32 * a + px[2] as f32 * (1.0 - a)).clamp(0.0, 255.0) as u8;
    px[3] = 255;
}

/// Draw `src_rect` of `image` scaled into `dst_rect` of `frame`.
///
/// The image's own alpha is multiplied by `opacity`. With `clip`, only
/// destination pixels whose center lies inside the circle are touched.
pub fn draw_image(
    frame: &mut VideoFrame,
    image: &VideoFrame,
    src_rect: Rect,
    dst_rect: Rect,
    opacity: f32,
    clip: Option<Circle>,
) {
    if src_rect.is_empty()
        || dst_rect.is_empty()
        || !image.is_well_formed()
        || !frame.is_well_formed()
    {
        return;
    }

    let x0 = dst_rect.x.floor().max(0.0) as i64;
    let y0 = dst_rect.y.floor().max(0.0) as i64;
    let x1 = ((dst_rect.x + dst_rect.width).ceil() as i64).min(frame.width as i64);
    let y1 = ((dst_rect.y + dst_rect.height).ceil() as i64).min(frame.height as i64);
    let sx_scale = src_rect.width / dst_rect.width;
    let sy_scale = src_rect.height / dst_rect.height;

    for y in y0..y1 {
        let cy = y as f64 + 0.5;
        if cy < dst_rect.y || cy >= dst_rect.y + dst_rect.height {
            continue;
        }
        let src_y = (src_rect.y + (cy - dst_rect.y) * sy_scale) as i64;
        let src_y = src_y.clamp(0, image.height as i64 - 1) as usize;

        for x in x0..x1 {
            let cx = x as f64 + 0.5;
            if cx < dst_rect.x || cx >= dst_rect.x + dst_rect.width {
                continue;
            }
            if let Some(circle) = clip {
                let dx = cx - circle.center.x;
                let dy = cy - circle.center.y;
                if dx * dx + dy * dy > circle.radius * circle.radius {
                    continue;
                }
            }

            let src_x = (src_rect.x + (cx - dst_rect.x) * sx_scale) as i64;
            let src_x = src_x.clamp(0, image.width as i64 - 1) as usize;
            let src_idx = (src_y * image.width as usize + src_x) * 4;
            let src = &image.data[src_idx..src_idx + 4];

            let color = Color {
                r: src[0],
                g: src[1],
                b: src[2],
                a: src[3],
            };
            if opacity >= 1.0 && color.a == 255 {
                let dst_idx = (y as usize * frame.width as usize + x as usize) * 4;
                frame.data[dst_idx..dst_idx + 4].copy_from_slice(src);
            } else {
                blend_pixel(frame, x, y, color, opacity);
            }
        }
    }
}

/// Stroke a circle outline of the given line width
pub fn stroke_ring(
    frame: &mut VideoFrame,
    center: Point,
    radius: f64,
    line_width: f64,
    color: Color,
    alpha: f32,
) {
    let half = line_width / 2.0;
    let outer = radius + half;
    let inner = (radius - half).max(0.0);

    let x0 = (center.x - outer).floor() as i64;
    let x1 = (center.x + outer).ceil() as i64;
    let y0 = (center.y - outer).floor() as i64;
    let y1 = (center.y + outer).ceil() as i64;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f64 + 0.5 - center.x;
            let dy = y as f64 + 0.5 - center.y;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist >= inner && dist <= outer {
                blend_pixel(frame, x, y, color, alpha);
            }
        }
    }
}

/// Stroke a polyline with round caps and joins. Fewer than two points draw
/// nothing.
pub fn stroke_polyline(frame: &mut VideoFrame, points: &[Point], width: f64, color: Color) {
    if points.len() < 2 {
        return;
    }
    let half = width / 2.0;
    for segment in points.windows(2) {
        draw_capsule(frame, segment[0], segment[1], half, color);
    }
}

fn draw_capsule(frame: &mut VideoFrame, a: Point, b: Point, half_width: f64, color: Color) {
    let x0 = (a.x.min(b.x) - half_width).floor() as i64;
    let x1 = (a.x.max(b.x) + half_width).ceil() as i64;
    let y0 = (a.y.min(b.y) - half_width).floor() as i64;
    let y1 = (a.y.max(b.y) + half_width).ceil() as i64;

    let (vx, vy) = (b.x - a.x, b.y - a.y);
    let len_sq = vx * vx + vy * vy;
    let limit = half_width * half_width;

    for y in y0.max(0)..=y1.min(frame.height as i64 - 1) {
        for x in x0.max(0)..=x1.min(frame.width as i64 - 1) {
            let px = x as f64 + 0.5;
            let py = y as f64 + 0.5;
            let t = if len_sq > 0.0 {
                (((px - a.x) * vx + (py - a.y) * vy) / len_sq).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let dx = px - (a.x + t * vx);
            let dy = py - (a.y + t * vy);
            if dx * dx + dy * dy <= limit {
                blend_pixel(frame, x, y, color, 1.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_rect_letterboxes() {
        let rect = fit_rect(Resolution::new(1920, 1080), Resolution::new(1000, 1000));
        assert!((rect.width - 1000.0).abs() < 1e-9);
        assert!((rect.height - 562.5).abs() < 1e-9);
        assert!(rect.x.abs() < 1e-9);
        assert!((rect.y - 218.75).abs() < 1e-9);
    }

    #[test]
    fn test_center_square() {
        let rect = center_square(Resolution::new(640, 480));
        assert_eq!(rect, Rect::new(80.0, 0.0, 480.0, 480.0));
    }

    #[test]
    fn test_draw_image_scales_up() {
        let mut frame = VideoFrame::solid(4, 4, [0, 0, 0, 255]);
        let image = VideoFrame::solid(2, 2, [200, 100, 50, 255]);
        draw_image(
            &mut frame,
            &image,
            Rect::new(0.0, 0.0, 2.0, 2.0),
            Rect::new(0.0, 0.0, 4.0, 4.0),
            1.0,
            None,
        );
        assert_eq!(frame.pixel(3, 3), Some([200, 100, 50, 255]));
    }

    #[test]
    fn test_draw_image_respects_opacity_and_clip() {
        let mut frame = VideoFrame::solid(10, 10, [0, 0, 0, 255]);
        let image = VideoFrame::solid(10, 10, [255, 255, 255, 255]);
        let clip = Circle {
            center: Point::new(5.0, 5.0),
            radius: 3.0,
        };
        draw_image(
            &mut frame,
            &image,
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(0.0, 0.0, 10.0, 10.0),
            0.5,
            Some(clip),
        );
        let center = frame.pixel(5, 5).unwrap();
        assert!((126..=128).contains(&center[0]));
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_single_point_polyline_draws_nothing() {
        let mut frame = VideoFrame::solid(10, 10, [0, 0, 0, 255]);
        stroke_polyline(&mut frame, &[Point::new(5.0, 5.0)], 5.0, Color::WHITE);
        assert!(frame.data.chunks(4).all(|px| px[0] == 0));
    }

    #[test]
    fn test_polyline_covers_segment() {
        let mut frame = VideoFrame::solid(20, 20, [0, 0, 0, 255]);
        stroke_polyline(
            &mut frame,
            &[Point::new(2.0, 10.0), Point::new(18.0, 10.0)],
            5.0,
            Color::WHITE,
        );
        assert_eq!(frame.pixel(10, 10), Some([255, 255, 255, 255]));
        assert_eq!(frame.pixel(10, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_ring_leaves_center_untouched() {
        let mut frame = VideoFrame::solid(40, 40, [0, 0, 0, 255]);
        stroke_ring(&mut frame, Point::new(20.0, 20.0), 10.0, 3.0, Color::AMBER, 1.0);
        assert_eq!(frame.pixel(20, 20), Some([0, 0, 0, 255]));
        assert_eq!(frame.pixel(29, 19), Some([250, 204, 21, 255]));
    }
}
