//! Video frames as handed from a frame source to the tracker.
//!
//! - `Frame`: pixel buffer plus geometry. Pixels are shared read-only
//!   (`Arc<[u8]>`), so cloning a frame for a capture task is cheap and the
//!   task never observes later frames.
//! - `PixelFormat`: the packed layouts the detectors and codec understand.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Instant;

use crate::geometry::BoundingBox;

/// Packed 8-bit pixel layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

/// One decoded video frame.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Source-assigned sequence number.
    pub sequence: u64,
    /// Monotonic capture instant.
    pub captured_at: Instant,
}

impl Frame {
    /// Wrap a pixel buffer. The buffer must be exactly `width * height` pixels.
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Result<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} {:?}",
                data.len(),
                expected,
                width,
                height,
                format
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn with_captured_at(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Luminance of the pixel at `(x, y)` (BT.601 integer weights).
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride() + x as usize * bpp;
        let px = &self.data[offset..offset + bpp];
        let (r, g, b) = match self.format {
            PixelFormat::Gray8 => return px[0],
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => (px[0], px[1], px[2]),
            PixelFormat::Bgra8 => (px[2], px[1], px[0]),
        };
        ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
    }

    /// Copy the pixels inside `region` as tightly packed RGB8.
    ///
    /// `region` is clamped to the frame first; `None` if nothing remains.
    pub fn crop_rgb(&self, region: &BoundingBox) -> Option<(BoundingBox, Vec<u8>)> {
        let region = region.clamp_to(self.width, self.height)?;
        let bpp = self.format.bytes_per_pixel();
        let stride = self.stride();
        let mut out = Vec::with_capacity(region.width as usize * region.height as usize * 3);

        for row in region.y..region.y + region.height {
            let start = row as usize * stride + region.x as usize * bpp;
            let end = start + region.width as usize * bpp;
            for px in self.data[start..end].chunks_exact(bpp) {
                match self.format {
                    PixelFormat::Gray8 => out.extend_from_slice(&[px[0], px[0], px[0]]),
                    PixelFormat::Rgb8 | PixelFormat::Rgba8 => out.extend_from_slice(&px[..3]),
                    PixelFormat::Bgra8 => out.extend_from_slice(&[px[2], px[1], px[0]]),
                }
            }
        }
        Some((region, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32, format: PixelFormat) -> Frame {
        let bpp = format.bytes_per_pixel();
        let mut data = vec![0u8; width as usize * height as usize * bpp];
        for (i, px) in data.chunks_exact_mut(bpp).enumerate() {
            for (c, byte) in px.iter_mut().enumerate() {
                *byte = ((i * 7 + c) % 256) as u8;
            }
        }
        Frame::new(data, width, height, format, 0).unwrap()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 4, 4, PixelFormat::Rgb8, 0).is_err());
        assert!(Frame::new(vec![0u8; 48], 4, 4, PixelFormat::Rgb8, 0).is_ok());
    }

    #[test]
    fn clone_shares_pixels() {
        let frame = gradient_frame(8, 8, PixelFormat::Rgba8);
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.pixels().as_ptr(), copy.pixels().as_ptr()));
    }

    #[test]
    fn crop_is_clamped_and_packed_rgb() {
        let frame = gradient_frame(10, 10, PixelFormat::Bgra8);
        let (region, rgb) = frame
            .crop_rgb(&BoundingBox::new(8, 8, 5, 5))
            .expect("crop");
        assert_eq!(region, BoundingBox::new(8, 8, 2, 2));
        assert_eq!(rgb.len(), 2 * 2 * 3);

        // First cropped pixel is (8, 8): BGRA -> RGB swaps channels 0 and 2.
        let offset = (8 * 10 + 8) * 4;
        let src = &frame.pixels()[offset..offset + 4];
        assert_eq!(&rgb[..3], &[src[2], src[1], src[0]]);
    }

    #[test]
    fn crop_outside_frame_is_none() {
        let frame = gradient_frame(10, 10, PixelFormat::Gray8);
        assert!(frame.crop_rgb(&BoundingBox::new(20, 20, 5, 5)).is_none());
    }

    #[test]
    fn luma_of_gray_is_identity() {
        let frame = Frame::new(vec![42u8; 4], 2, 2, PixelFormat::Gray8, 0).unwrap();
        assert_eq!(frame.luma_at(1, 1), 42);
    }
}
