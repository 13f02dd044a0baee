//! Owned RGBA pixel surface.

use super::{Paint, Point, Rect, Stroke, Surface, SurfaceGeometry};
use crate::color::{lerp_color, Rgba};

/// Upper bound on rasterization steps for a single segment or arc.
const MAX_STEPS: usize = 1 << 14;

/// Owned RGBA pixel buffer.
///
/// Internal format is 4 bytes per pixel in **RGBA** order, not premultiplied.
/// Every drawing operation blends source-over and clips to the buffer.
pub struct Canvas {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0u8; width * height * 4],
            width,
            height,
        }
    }

    /// Resize the canvas. Contents are cleared when the size actually changes.
    pub fn resize(&mut self, width: usize, height: usize) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width * height * 4, 0);
    }

    /// Read the RGBA values at (x, y).
    #[inline]
    pub fn get_pixel(&self, x: usize, y: usize) -> Rgba {
        if x >= self.width || y >= self.height {
            return Rgba::default();
        }
        let idx = (y * self.width + x) * 4;
        Rgba {
            r: self.data[idx],
            g: self.data[idx + 1],
            b: self.data[idx + 2],
            a: self.data[idx + 3],
        }
    }

    /// Blend `color` over the pixel at (x, y). Out-of-range coordinates are ignored.
    #[inline]
    pub fn blend_pixel(&mut self, x: isize, y: isize, color: Rgba) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height || color.a == 0 {
            return;
        }
        let idx = (y as usize * self.width + x as usize) * 4;
        if color.a == 255 {
            self.data[idx..idx + 4].copy_from_slice(&[color.r, color.g, color.b, 255]);
            return;
        }
        let sa = color.a as f32 / 255.0;
        let da = self.data[idx + 3] as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            return;
        }
        let mix = |s: u8, d: u8| ((s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a).round() as u8;
        self.data[idx] = mix(color.r, self.data[idx]);
        self.data[idx + 1] = mix(color.g, self.data[idx + 1]);
        self.data[idx + 2] = mix(color.b, self.data[idx + 2]);
        self.data[idx + 3] = (out_a * 255.0).round() as u8;
    }

    /// Square brush of side `size` centered on (x, y).
    fn stamp(&mut self, x: f32, y: f32, size: f32, color: Rgba) {
        let half = (size.max(1.0) - 1.0) / 2.0;
        let x0 = (x - half).round() as isize;
        let x1 = (x + half).round() as isize;
        let y0 = (y - half).round() as isize;
        let y1 = (y + half).round() as isize;
        for py in y0..=y1 {
            for px in x0..=x1 {
                self.blend_pixel(px, py, color);
            }
        }
    }

    fn segment(&mut self, from: Point, to: Point, stroke: &Stroke) {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let steps = (dx.abs().max(dy.abs()).ceil() as usize).clamp(1, MAX_STEPS);
        // The end point is left to the next segment so joints are not blended twice.
        for s in 0..steps {
            let t = s as f32 / steps as f32;
            self.stamp(from.x + dx * t, from.y + dy * t, stroke.width, stroke.color);
        }
    }
}

impl Surface for Canvas {
    fn geometry(&self) -> Option<SurfaceGeometry> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(SurfaceGeometry::new(self.width as f32, self.height as f32))
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        if !rect.is_finite() {
            return;
        }
        let (left, right) = if rect.width < 0.0 {
            (rect.x + rect.width, rect.x)
        } else {
            (rect.x, rect.x + rect.width)
        };
        let (top, bottom) = if rect.height < 0.0 {
            (rect.y + rect.height, rect.y)
        } else {
            (rect.y, rect.y + rect.height)
        };

        let x0 = left.floor().max(0.0) as usize;
        let x1 = (right.ceil().max(0.0) as usize).min(self.width);
        let y0 = top.round().max(0.0) as usize;
        let y1 = (bottom.round().max(0.0) as usize).min(self.height);
        let span = (bottom - top).max(f32::EPSILON);

        for py in y0..y1 {
            let color = match *paint {
                Paint::Solid(c) => c,
                Paint::VerticalGradient { bottom: b, top: t } => {
                    lerp_color(b, t, (bottom - (py as f32 + 0.5)) / span)
                }
            };
            for px in x0..x1 {
                self.blend_pixel(px as isize, py as isize, color);
            }
        }
    }

    fn stroke_path(&mut self, points: &[Point], closed: bool, stroke: &Stroke) {
        match points {
            [] => {}
            [single] => self.stamp(single.x, single.y, stroke.width, stroke.color),
            _ => {
                for pair in points.windows(2) {
                    self.segment(pair[0], pair[1], stroke);
                }
                if closed {
                    self.segment(points[points.len() - 1], points[0], stroke);
                } else {
                    let last = points[points.len() - 1];
                    self.stamp(last.x, last.y, stroke.width, stroke.color);
                }
            }
        }
    }

    fn stroke_arc(&mut self, center: Point, radius: f32, start: f32, end: f32, stroke: &Stroke) {
        if radius <= 0.0 || !radius.is_finite() {
            return;
        }
        let sweep = end - start;
        let steps = ((radius * sweep.abs()).ceil() as usize).clamp(8, MAX_STEPS);
        let points: Vec<Point> = (0..=steps)
            .map(|i| {
                let angle = start + sweep * i as f32 / steps as f32;
                Point::new(center.x + angle.cos() * radius, center.y + angle.sin() * radius)
            })
            .collect();
        self.stroke_path(&points, false, stroke);
    }
}
