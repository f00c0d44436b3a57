//! Capture and transmit.
//!
//! When an identity becomes eligible, the worker hands a `CaptureRequest`
//! (identity, box, and a cheap clone of the frame it was detected on) to the
//! `CapturePipeline`, which clamps the box, encodes the crop, and sends it to
//! the collector on a detached thread.

mod codec;
mod pipeline;

pub use codec::{FrameCodec, JpegCodec, DEFAULT_JPEG_QUALITY};
pub use pipeline::{CaptureCounts, CapturePipeline, CaptureRequest, CaptureStats};
