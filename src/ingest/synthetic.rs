//! Synthetic frame source.
//!
//! Renders a dark, noisy background with one bright square that drifts
//! slowly across the frame. The square is visible for `VISIBLE_FRAMES`
//! frames, then hidden for `HIDDEN_FRAMES`, so the tracker sees identities
//! appear, dwell, and leave.

use anyhow::Result;
use rand::Rng;

use super::{FramePacer, FrameSource, SourceConfig, SourceStats};
use crate::frame::{Frame, PixelFormat};
use crate::geometry::BoundingBox;

const SQUARE_SIZE: u32 = 96;
const VISIBLE_FRAMES: u64 = 120;
const HIDDEN_FRAMES: u64 = 20;
const BACKGROUND_NOISE: u8 = 48;

pub struct SyntheticSource {
    config: SourceConfig,
    pacer: FramePacer,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        let pacer = FramePacer::new(config.target_fps);
        Self {
            config,
            pacer,
            frame_count: 0,
        }
    }

    /// Where the square is drawn on frame `n`, if it is visible.
    pub fn square_at(&self, n: u64) -> Option<BoundingBox> {
        if n % (VISIBLE_FRAMES + HIDDEN_FRAMES) >= VISIBLE_FRAMES {
            return None;
        }
        let size = SQUARE_SIZE.min(self.config.width).min(self.config.height);
        let span = (self.config.width - size).max(1) as u64;
        // Bounce back and forth, one pixel per frame.
        let phase = n % (2 * span);
        let x = if phase < span { phase } else { 2 * span - phase };
        let y = (self.config.height - size) / 2;
        Some(BoundingBox::new(x as i32, y as i32, size as i32, size as i32))
    }

    fn render(&self, n: u64) -> Vec<u8> {
        let (w, h) = (self.config.width, self.config.height);
        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u8; w as usize * h as usize * 3];
        for pixel in pixels.iter_mut() {
            *pixel = rng.gen_range(0..BACKGROUND_NOISE);
        }

        if let Some(square) = self.square_at(n) {
            for y in square.y..square.y + square.height {
                let row = y as usize * w as usize * 3;
                let start = row + square.x as usize * 3;
                let end = start + square.width as usize * 3;
                pixels[start..end].fill(240);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn latest_frame(&mut self) -> Result<Option<Frame>> {
        if !self.pacer.due() {
            return Ok(None);
        }
        let n = self.frame_count;
        self.frame_count += 1;
        let pixels = self.render(n);
        let frame = Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Rgb8,
            n,
        )?;
        Ok(Some(frame))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
