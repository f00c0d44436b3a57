//! Tracking worker and the published detection snapshot.
//!
//! One background thread runs pull -> detect -> track -> publish until the
//! handle is stopped. The identity map lives on that thread only. The one
//! structure shared with other threads is `PublishedBoxes`, the latest
//! frame's raw detections behind a reader-writer lock, replaced wholesale once
//! per frame.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::{CapturePipeline, CaptureRequest};
use crate::detect::{is_cancelled, DetectorBackend};
use crate::frame::Frame;
use crate::geometry::BoundingBox;
use crate::ingest::FrameSource;
use crate::tracker::{IdentityTracker, TrackerSettings};

const IDLE_BACKOFF: Duration = Duration::from_millis(5);
const SOURCE_ERROR_BACKOFF: Duration = Duration::from_millis(100);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Latest frame's detections, readable from any thread.
#[derive(Clone, Debug, Default)]
pub struct PublishedBoxes {
    inner: Arc<RwLock<Vec<BoundingBox>>>,
}

impl PublishedBoxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot. Readers see either the old or the new list.
    pub fn publish(&self, boxes: Vec<BoundingBox>) {
        // The list is swapped in one assignment, so a poisoned lock still
        // guards a complete snapshot.
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = boxes;
    }

    /// True iff the last processed frame had at least one detection.
    pub fn is_tracking(&self) -> bool {
        !self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Copy of the last processed frame's detections, in detector order.
    pub fn latest(&self) -> Vec<BoundingBox> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Loop counters, readable from the handle.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    captures_launched: AtomicU64,
}

impl WorkerCounters {
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped.load(Ordering::Relaxed)
    }

    pub fn captures_launched(&self) -> u64 {
        self.captures_launched.load(Ordering::Relaxed)
    }
}

/// What one loop iteration did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// No frame was ready, or the source failed.
    Idle,
    /// The detector failed or cancelled; tracker and snapshot untouched.
    Skipped,
    /// The frame was tracked and published.
    Tracked { live: usize, captures: usize },
}

pub struct TrackingWorker {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    tracker: IdentityTracker,
    pipeline: CapturePipeline,
    published: PublishedBoxes,
    counters: Arc<WorkerCounters>,
}

impl TrackingWorker {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DetectorBackend>,
        settings: TrackerSettings,
        pipeline: CapturePipeline,
    ) -> Self {
        Self {
            source,
            detector,
            tracker: IdentityTracker::new(settings),
            pipeline,
            published: PublishedBoxes::new(),
            counters: Arc::new(WorkerCounters::default()),
        }
    }

    pub fn published(&self) -> PublishedBoxes {
        self.published.clone()
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    pub fn counters(&self) -> Arc<WorkerCounters> {
        self.counters.clone()
    }

    /// One iteration: poll the source and process the frame if one is ready.
    pub fn process_next(&mut self) -> StepOutcome {
        match self.source.latest_frame() {
            Ok(Some(frame)) => {
                let now = frame.captured_at;
                self.process_frame(&frame, now)
            }
            Ok(None) => StepOutcome::Idle,
            Err(err) => {
                log::warn!("frame source error: {:#}", err);
                std::thread::sleep(SOURCE_ERROR_BACKOFF);
                StepOutcome::Idle
            }
        }
    }

    /// Detect, track, launch captures, and publish for one frame.
    pub fn process_frame(&mut self, frame: &Frame, now: Instant) -> StepOutcome {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(err) => {
                self.counters.frames_skipped.fetch_add(1, Ordering::Relaxed);
                if is_cancelled(&err) {
                    log::debug!("frame {} skipped: {}", frame.sequence, err);
                } else {
                    log::warn!(
                        "frame {} skipped: {} detector failed: {:#}",
                        frame.sequence,
                        self.detector.name(),
                        err
                    );
                }
                return StepOutcome::Skipped;
            }
        };

        let update = self.tracker.update(&detections, now);
        for object in &update.newly_eligible {
            log::info!(
                "identity {} dwelled {:.1}s at {:?}; capturing",
                object.id,
                object.dwell(now).as_secs_f64(),
                object.bounding_box
            );
            // Detached: the handle is dropped and the thread runs on its own.
            let _ = self.pipeline.launch(CaptureRequest::new(object, frame));
        }

        self.published.publish(detections);
        self.counters.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .captures_launched
            .fetch_add(update.newly_eligible.len() as u64, Ordering::Relaxed);

        StepOutcome::Tracked {
            live: self.tracker.len(),
            captures: update.newly_eligible.len(),
        }
    }

    /// Run on a dedicated thread until the returned handle is stopped.
    pub fn spawn(mut self) -> Result<TrackingHandle> {
        self.source.connect()?;
        self.detector.warm_up()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let published = self.published.clone();
        let counters = self.counters.clone();

        let join = std::thread::Builder::new()
            .name("tracking-worker".to_string())
            .spawn(move || self.run(&shutdown_thread))?;

        Ok(TrackingHandle {
            published,
            counters,
            shutdown,
            join: Some(join),
        })
    }

    fn run(&mut self, shutdown: &AtomicBool) {
        log::info!(
            "tracking worker started (detector={}, capture after {:.1}s, iou > {:.2})",
            self.detector.name(),
            self.tracker.settings().capture_threshold.as_secs_f64(),
            self.tracker.settings().iou_threshold
        );
        let mut last_health_log = Instant::now();

        while !shutdown.load(Ordering::SeqCst) {
            if self.process_next() == StepOutcome::Idle {
                std::thread::sleep(IDLE_BACKOFF);
            }

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.source.stats();
                log::debug!(
                    "source {} healthy={} frames={}; processed={} skipped={} live={} captures={}",
                    stats.source,
                    self.source.is_healthy(),
                    stats.frames_captured,
                    self.counters.frames_processed(),
                    self.counters.frames_skipped(),
                    self.tracker.len(),
                    self.counters.captures_launched()
                );
                last_health_log = Instant::now();
            }
        }
        log::info!(
            "tracking worker stopped after {} frames",
            self.counters.frames_processed()
        );
    }
}

/// Owner of the running worker thread.
///
/// Stopping (or dropping) the handle signals the loop and joins it; the loop
/// finishes its current iteration first. Capture threads already launched are
/// not waited for.
#[derive(Debug)]
pub struct TrackingHandle {
    published: PublishedBoxes,
    counters: Arc<WorkerCounters>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl TrackingHandle {
    pub fn is_tracking(&self) -> bool {
        self.published.is_tracking()
    }

    pub fn latest_boxes(&self) -> Vec<BoundingBox> {
        self.published.latest()
    }

    pub fn published(&self) -> PublishedBoxes {
        self.published.clone()
    }

    pub fn counters(&self) -> Arc<WorkerCounters> {
        self.counters.clone()
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("tracking worker thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown_and_join() {
            log::error!("{}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameCodec;
    use crate::detect::{ScriptedBackend, ScriptedResponse};
    use crate::frame::PixelFormat;
    use crate::ingest::SourceStats;
    use crate::transport::CollectorTransport;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct QueueSource {
        frames: VecDeque<Option<Frame>>,
    }

    impl FrameSource for QueueSource {
        fn latest_frame(&mut self) -> Result<Option<Frame>> {
            Ok(self.frames.pop_front().flatten())
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: 0,
                source: "queue".to_string(),
            }
        }
    }

    struct TagCodec;

    impl FrameCodec for TagCodec {
        fn encode(&self, frame: &Frame, _region: &BoundingBox) -> Result<Vec<u8>> {
            Ok(frame.sequence.to_be_bytes().to_vec())
        }

        fn name(&self) -> &'static str {
            "tag"
        }
    }

    #[derive(Default)]
    struct Sink(Mutex<Vec<Vec<u8>>>);

    impl CollectorTransport for Sink {
        fn send(&self, payload: &[u8]) -> Result<()> {
            self.0.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        fn describe(&self) -> String {
            "sink".to_string()
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0u8; 16 * 16], 16, 16, PixelFormat::Gray8, seq).unwrap()
    }

    fn worker(frames: Vec<Option<Frame>>, detector: ScriptedBackend) -> (TrackingWorker, Arc<Sink>) {
        let sink = Arc::new(Sink::default());
        let pipeline = CapturePipeline::new(Arc::new(TagCodec), sink.clone());
        let source = QueueSource {
            frames: frames.into(),
        };
        let settings = TrackerSettings {
            capture_threshold: Duration::from_secs(1),
            ..TrackerSettings::default()
        };
        (
            TrackingWorker::new(Box::new(source), Box::new(detector), settings, pipeline),
            sink,
        )
    }

    #[test]
    fn published_snapshot_is_raw_detections() {
        let a = BoundingBox::new(0, 0, 4, 4);
        let b = BoundingBox::new(8, 8, 4, 4);
        let (mut worker, _) = worker(vec![], ScriptedBackend::constant(vec![a, b]));
        let published = worker.published();
        assert!(!published.is_tracking());

        let outcome = worker.process_frame(&frame(0), Instant::now());
        assert_eq!(outcome, StepOutcome::Tracked { live: 2, captures: 0 });
        assert!(published.is_tracking());
        assert_eq!(published.latest(), vec![a, b]);
    }

    #[test]
    fn detector_failure_leaves_state_untouched() {
        let a = BoundingBox::new(0, 0, 4, 4);
        let detector = ScriptedBackend::with_script([
            ScriptedResponse::Boxes(vec![a]),
            ScriptedResponse::Cancelled,
            ScriptedResponse::Failed("npu reset".into()),
            ScriptedResponse::Boxes(vec![]),
        ]);
        let (mut worker, _) = worker(vec![], detector);
        let base = Instant::now();

        worker.process_frame(&frame(0), base);
        assert_eq!(
            worker.process_frame(&frame(1), base + Duration::from_millis(100)),
            StepOutcome::Skipped
        );
        assert_eq!(
            worker.process_frame(&frame(2), base + Duration::from_millis(200)),
            StepOutcome::Skipped
        );
        assert_eq!(worker.tracker().len(), 1);
        assert_eq!(worker.published().latest(), vec![a]);
        assert_eq!(worker.counters().frames_skipped(), 2);

        worker.process_frame(&frame(3), base + Duration::from_millis(300));
        assert!(worker.tracker().is_empty());
        assert!(!worker.published().is_tracking());
    }

    #[test]
    fn capture_uses_the_triggering_frame() {
        let a = BoundingBox::new(2, 2, 8, 8);
        let (mut worker, sink) = worker(vec![], ScriptedBackend::constant(vec![a]));
        let base = Instant::now();

        for i in 0..5u64 {
            worker.process_frame(&frame(i), base + Duration::from_millis(i * 500));
        }
        assert_eq!(worker.counters().captures_launched(), 1);

        // The capture thread is detached; wait for it to land.
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.0.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        // Eligible at 1.0s, i.e. frame 2.
        assert_eq!(*sink.0.lock().unwrap(), vec![2u64.to_be_bytes().to_vec()]);
    }

    #[test]
    fn process_next_idles_without_frames() {
        let (mut worker, _) = worker(
            vec![None, Some(frame(0))],
            ScriptedBackend::constant(vec![]),
        );
        assert_eq!(worker.process_next(), StepOutcome::Idle);
        assert_eq!(
            worker.process_next(),
            StepOutcome::Tracked { live: 0, captures: 0 }
        );
    }

    #[test]
    fn process_next_dwells_on_frame_capture_time() {
        let a = BoundingBox::new(2, 2, 8, 8);
        let base = Instant::now();
        let frames = (0..3u64)
            .map(|i| Some(frame(i).with_captured_at(base + Duration::from_millis(i * 600))))
            .collect();
        let (mut worker, _) = worker(frames, ScriptedBackend::constant(vec![a]));

        assert_eq!(
            worker.process_next(),
            StepOutcome::Tracked { live: 1, captures: 0 }
        );
        assert_eq!(
            worker.process_next(),
            StepOutcome::Tracked { live: 1, captures: 0 }
        );
        // 1.2s after the first frame was captured, regardless of wall time.
        assert_eq!(
            worker.process_next(),
            StepOutcome::Tracked { live: 1, captures: 1 }
        );
    }

    #[test]
    fn handle_stops_running_worker() {
        let a = BoundingBox::new(0, 0, 4, 4);
        let frames = (0..1000).map(|i| Some(frame(i))).collect();
        let (worker, _) = worker(frames, ScriptedBackend::constant(vec![a]));
        let handle = worker.spawn().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_tracking() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_tracking());
        assert_eq!(handle.latest_boxes(), vec![a]);
        assert!(handle.is_running());
        handle.stop().unwrap();
    }
}
