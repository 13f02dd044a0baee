//! Drawing primitives and the surface they are painted on.
//!
//! Visual styles never touch pixels directly: they emit a display list of
//! [`DrawCommand`]s which the render loop replays onto a [`Surface`]. The
//! pixel-backed [`canvas::Canvas`] is the surface used by the terminal shell.

pub mod canvas;

pub use canvas::Canvas;

use crate::color::Rgba;

/// Size of the current drawing target, in surface pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceGeometry {
    pub width: f32,
    pub height: f32,
}

impl SurfaceGeometry {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when there is nothing to draw on (zero, negative or non-finite extent).
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// Fill style for rectangles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    Solid(Rgba),
    /// Linear gradient running from the bottom edge of the filled rect to its top edge.
    VerticalGradient { bottom: Rgba, top: Rgba },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Rgba,
    pub width: f32,
}

impl Stroke {
    pub fn new(color: Rgba, width: f32) -> Self {
        Self { color, width }
    }
}

/// One immediate-mode drawing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect { rect: Rect, paint: Paint },
    /// move-to the first point, line-to the rest, stroke once.
    Path {
        points: Vec<Point>,
        closed: bool,
        stroke: Stroke,
    },
    /// Arc around `center`, angles in radians measured clockwise from +x (y grows down).
    Arc {
        center: Point,
        radius: f32,
        start: f32,
        end: f32,
        stroke: Stroke,
    },
}

impl DrawCommand {
    /// Whether every coordinate in the command is a real number.
    pub fn is_finite(&self) -> bool {
        match self {
            DrawCommand::FillRect { rect, .. } => rect.is_finite(),
            DrawCommand::Path { points, stroke, .. } => {
                stroke.width.is_finite() && points.iter().all(Point::is_finite)
            }
            DrawCommand::Arc {
                center,
                radius,
                start,
                end,
                stroke,
            } => {
                center.is_finite()
                    && radius.is_finite()
                    && start.is_finite()
                    && end.is_finite()
                    && stroke.width.is_finite()
            }
        }
    }
}

/// A 2D drawing target.
pub trait Surface {
    /// Current geometry, or `None` while the surface is not ready to be drawn on.
    fn geometry(&self) -> Option<SurfaceGeometry>;

    fn fill_rect(&mut self, rect: Rect, paint: &Paint);

    fn stroke_path(&mut self, points: &[Point], closed: bool, stroke: &Stroke);

    fn stroke_arc(&mut self, center: Point, radius: f32, start: f32, end: f32, stroke: &Stroke);

    fn draw(&mut self, command: &DrawCommand) {
        match command {
            DrawCommand::FillRect { rect, paint } => self.fill_rect(*rect, paint),
            DrawCommand::Path {
                points,
                closed,
                stroke,
            } => self.stroke_path(points, *closed, stroke),
            DrawCommand::Arc {
                center,
                radius,
                start,
                end,
                stroke,
            } => self.stroke_arc(*center, *radius, *start, *end, stroke),
        }
    }
}
