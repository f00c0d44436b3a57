//! Dwell-time object tracker.
//!
//! Consumes per-frame detections, keeps a persistent identity for each object
//! across frames, and sends one cropped snapshot of every identity that stays
//! in view for the configured dwell time to a remote collector.
//!
//! - `geometry`: integer boxes and IoU.
//! - `tracker`: greedy first-match identity association and the capture trigger.
//! - `capture`: crop/encode/send, one detached thread per capture.
//! - `worker`: the background pull -> detect -> track -> publish loop.
//! - `ingest`, `detect`: frame sources and detector backends.
//! - `transport`, `collector`: the length-prefixed TCP wire protocol, both ends.

pub mod capture;
pub mod collector;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod tracker;
pub mod transport;
pub mod worker;

use anyhow::Result;
use std::sync::Arc;

pub use capture::{CapturePipeline, CaptureRequest, FrameCodec, JpegCodec};
pub use collector::{CollectorConfig, CollectorHandle, CollectorServer, DirectoryWriter};
pub use detect::{BackendRegistry, DetectorBackend, DetectorSettings, LumaBlobBackend};
pub use frame::{Frame, PixelFormat};
pub use geometry::{compute_iou, BoundingBox};
pub use ingest::{open_source, FrameSource, SourceConfig};
pub use tracker::{IdentityTracker, TrackUpdate, TrackedObject, TrackerSettings};
pub use transport::{CollectorTransport, TcpCollector};
pub use worker::{PublishedBoxes, StepOutcome, TrackingHandle, TrackingWorker};

/// Build a worker from configuration: source, detector, and a JPEG-over-TCP
/// capture pipeline.
pub fn build_worker(cfg: &config::DwellConfig) -> Result<TrackingWorker> {
    let source = open_source(cfg.source.clone())?;

    let mut registry = BackendRegistry::new();
    registry.register(LumaBlobBackend::new(
        cfg.detector_settings(),
        cfg.detector.luma_threshold,
    ));
    let detector = registry.take(&cfg.detector.backend)?;

    let transport = TcpCollector::new(cfg.collector_endpoint())
        .with_timeouts(cfg.collector.connect_timeout, cfg.collector.write_timeout);
    let pipeline = CapturePipeline::new(
        Arc::new(JpegCodec::new(cfg.jpeg_quality)),
        Arc::new(transport),
    );

    Ok(TrackingWorker::new(
        source,
        detector,
        cfg.tracker_settings(),
        pipeline,
    ))
}
