use anyhow::Result;

use crate::detect::backend::{DetectorBackend, DetectorSettings};
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Default luminance cut-off for "bright" pixels.
pub const DEFAULT_LUMA_THRESHOLD: u8 = 200;

/// CPU backend that reports bright blobs.
///
/// Pixels at or above `threshold` luminance are grouped into 4-connected
/// components; each component's bounding box is a detection if it passes the
/// size limits. Output is ordered top-to-bottom, left-to-right by the first
/// pixel of each component.
pub struct LumaBlobBackend {
    settings: DetectorSettings,
    threshold: u8,
    mask: Vec<bool>,
    stack: Vec<(u32, u32)>,
}

impl LumaBlobBackend {
    pub fn new(settings: DetectorSettings, threshold: u8) -> Self {
        Self {
            settings,
            threshold,
            mask: Vec::new(),
            stack: Vec::new(),
        }
    }

    fn fill(&mut self, frame: &Frame, sx: u32, sy: u32) -> BoundingBox {
        let (w, h) = (frame.width, frame.height);
        let (mut x0, mut y0, mut x1, mut y1) = (sx, sy, sx, sy);

        self.mask[(sy * w + sx) as usize] = false;
        self.stack.push((sx, sy));
        while let Some((x, y)) = self.stack.pop() {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);

            let visit = |nx: u32, ny: u32, mask: &mut Vec<bool>, stack: &mut Vec<(u32, u32)>| {
                let idx = (ny * w + nx) as usize;
                if mask[idx] {
                    mask[idx] = false;
                    stack.push((nx, ny));
                }
            };
            if x > 0 {
                visit(x - 1, y, &mut self.mask, &mut self.stack);
            }
            if x + 1 < w {
                visit(x + 1, y, &mut self.mask, &mut self.stack);
            }
            if y > 0 {
                visit(x, y - 1, &mut self.mask, &mut self.stack);
            }
            if y + 1 < h {
                visit(x, y + 1, &mut self.mask, &mut self.stack);
            }
        }

        BoundingBox::new(
            x0 as i32,
            y0 as i32,
            (x1 - x0 + 1) as i32,
            (y1 - y0 + 1) as i32,
        )
    }
}

impl Default for LumaBlobBackend {
    fn default() -> Self {
        Self::new(DetectorSettings::default(), DEFAULT_LUMA_THRESHOLD)
    }
}

impl DetectorBackend for LumaBlobBackend {
    fn name(&self) -> &'static str {
        "luma"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>> {
        let (w, h) = (frame.width, frame.height);
        self.mask.clear();
        self.mask.reserve(w as usize * h as usize);
        for y in 0..h {
            for x in 0..w {
                self.mask.push(frame.luma_at(x, y) >= self.threshold);
            }
        }

        let mut boxes = Vec::new();
        for y in 0..h {
            for x in 0..w {
                if self.mask[(y * w + x) as usize] {
                    let bbox = self.fill(frame, x, y);
                    if self.settings.accepts(&bbox) {
                        boxes.push(bbox);
                    }
                }
            }
        }
        Ok(boxes)
    }
}
