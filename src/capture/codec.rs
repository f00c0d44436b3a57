use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::Frame;
use crate::geometry::BoundingBox;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Crops a region out of a frame and encodes it for the collector.
pub trait FrameCodec: Send + Sync {
    /// Encode the pixels of `frame` inside `region`.
    ///
    /// `region` is clamped to the frame before any pixel is read.
    fn encode(&self, frame: &Frame, region: &BoundingBox) -> Result<Vec<u8>>;

    /// Codec identifier.
    fn name(&self) -> &'static str;
}

/// Baseline JPEG encoder.
#[derive(Clone, Copy, Debug)]
pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameCodec for JpegCodec {
    fn encode(&self, frame: &Frame, region: &BoundingBox) -> Result<Vec<u8>> {
        let (clamped, rgb) = frame.crop_rgb(region).ok_or_else(|| {
            anyhow!(
                "region {:?} lies outside {}x{} frame",
                region,
                frame.width,
                frame.height
            )
        })?;

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(
                &rgb,
                clamped.width as u32,
                clamped.height as u32,
                ExtendedColorType::Rgb8,
            )
            .context("jpeg encode")?;
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "jpeg"
    }
}
