//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Synthetic scene (`stub://` URLs, demos and tests)
//! - Directory of still images replayed as video (`dir://` URLs)
//!
//! A source is polled by the tracking worker. `latest_frame` returns
//! `Ok(None)` when no new frame is ready yet; the worker treats that as a
//! no-op iteration and polls again.

pub mod image_dir;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::frame::Frame;

pub use image_dir::ImageDirSource;
pub use synthetic::SyntheticSource;

/// Frame source polled by the worker loop.
pub trait FrameSource: Send {
    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next frame if one is ready, `None` otherwise.
    fn latest_frame(&mut self) -> Result<Option<Frame>>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Configuration for a frame source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://<name>` or `dir://<path>`.
    pub url: String,
    /// Target frame rate (frames per second). Sources never emit faster.
    pub target_fps: u32,
    /// Frame width (synthetic sources only).
    pub width: u32,
    /// Frame height (synthetic sources only).
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://synthetic".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Largest accepted synthetic frame width or height, in pixels.
pub const MAX_SOURCE_DIMENSION: u32 = 8192;

/// Build the source named by `config.url`.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        if !(1..=MAX_SOURCE_DIMENSION).contains(&config.width)
            || !(1..=MAX_SOURCE_DIMENSION).contains(&config.height)
        {
            return Err(anyhow!(
                "synthetic frame size {}x{} outside 1..={}",
                config.width,
                config.height,
                MAX_SOURCE_DIMENSION
            ));
        }
        Ok(Box::new(SyntheticSource::new(config)))
    } else if let Some(path) = config.url.strip_prefix("dir://") {
        let path = path.to_string();
        Ok(Box::new(ImageDirSource::new(path, config.target_fps)?))
    } else {
        Err(anyhow!(
            "unsupported frame source '{}'; expected stub:// or dir://",
            config.url
        ))
    }
}

/// Paces a source to its target frame rate.
#[derive(Debug)]
pub(crate) struct FramePacer {
    interval: Duration,
    last: Option<Instant>,
}

impl FramePacer {
    pub(crate) fn new(target_fps: u32) -> Self {
        let interval = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / target_fps
        };
        Self {
            interval,
            last: None,
        }
    }

    /// True (and resets the timer) when a new frame is due.
    pub(crate) fn due(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
