//! Integer rectangle geometry.
//!
//! Boxes are in frame-pixel coordinates: `(x, y)` is the top-left corner,
//! `width`/`height` extend right and down. Coordinates are signed so that
//! malformed detector output (negative sizes) can be represented and
//! rejected by the overlap math instead of wrapping.

use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the box has no area (zero or negative extent).
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Area in pixels. Degenerate boxes have area zero.
    pub fn area(&self) -> i64 {
        if self.is_degenerate() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Clamp this box to a `frame_width` x `frame_height` bitmap.
    ///
    /// Returns `None` when nothing of the box lies inside the frame, so a crop
    /// derived from the result never reads outside the pixel buffer.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<BoundingBox> {
        if self.is_degenerate() || frame_width == 0 || frame_height == 0 {
            return None;
        }
        let fw = frame_width as i64;
        let fh = frame_height as i64;

        let x0 = (self.x as i64).clamp(0, fw);
        let y0 = (self.y as i64).clamp(0, fh);
        let x1 = self.right().clamp(0, fw);
        let y1 = self.bottom().clamp(0, fh);

        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(BoundingBox {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as i32,
            height: (y1 - y0) as i32,
        })
    }
}

/// Intersection-over-union of two boxes, in `[0, 1]`.
///
/// Degenerate inputs and boxes that only touch along an edge yield `0.0`.
pub fn compute_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    if a.is_degenerate() || b.is_degenerate() {
        return 0.0;
    }

    let x0 = (a.x as i64).max(b.x as i64);
    let y0 = (a.y as i64).max(b.y as i64);
    let x1 = a.right().min(b.right());
    let y1 = a.bottom().min(b.bottom());

    if x0 >= x1 || y0 >= y1 {
        return 0.0;
    }

    let inter = (x1 - x0) * (y1 - y0);
    let union = a.area() + b.area() - inter;
    if union <= 0 {
        return 0.0;
    }
    inter as f32 / union as f32
}
