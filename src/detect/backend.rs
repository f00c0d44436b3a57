use anyhow::Result;
use std::fmt;

use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// Default smallest object edge the detectors report, in pixels.
pub const DEFAULT_MIN_OBJECT_SIZE: u32 = 64;
/// Default largest object edge the detectors report, in pixels.
pub const DEFAULT_MAX_OBJECT_SIZE: u32 = 512;

/// Size limits applied to every detection a backend returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectorSettings {
    pub min_object_size: u32,
    pub max_object_size: u32,
}

impl DetectorSettings {
    /// True when both edges of `bbox` fall within the configured limits.
    pub fn accepts(&self, bbox: &BoundingBox) -> bool {
        if bbox.is_degenerate() {
            return false;
        }
        let (w, h) = (bbox.width as u32, bbox.height as u32);
        (self.min_object_size..=self.max_object_size).contains(&w)
            && (self.min_object_size..=self.max_object_size).contains(&h)
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_object_size: DEFAULT_MIN_OBJECT_SIZE,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }
}

/// Returned (inside `anyhow::Error`) when a backend abandons a frame.
///
/// The worker treats it as "skip this frame" without a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectionCancelled;

impl fmt::Display for DetectionCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("detection cancelled")
    }
}

impl std::error::Error for DetectionCancelled {}

/// True when `err` is a `DetectionCancelled`.
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DetectionCancelled>().is_some()
}

/// Detector backend trait.
///
/// Backends run synchronously on the worker thread. They receive the frame by
/// reference and return boxes in frame-pixel coordinates.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// An error skips the frame; the tracker state is left unchanged.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
