use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::codec::FrameCodec;
use crate::frame::Frame;
use crate::geometry::BoundingBox;
use crate::tracker::TrackedObject;
use crate::transport::CollectorTransport;

/// Everything a capture needs, copied at trigger time.
#[derive(Clone, Debug)]
pub struct CaptureRequest {
    pub identity: u64,
    pub region: BoundingBox,
    pub frame: Frame,
}

impl CaptureRequest {
    pub fn new(object: &TrackedObject, frame: &Frame) -> Self {
        Self {
            identity: object.id,
            region: object.bounding_box,
            frame: frame.clone(),
        }
    }
}

/// Counters shared by all capture threads.
#[derive(Debug, Default)]
pub struct CaptureStats {
    launched: AtomicU64,
    sent: AtomicU64,
    encode_failures: AtomicU64,
    transmit_failures: AtomicU64,
    spawn_failures: AtomicU64,
}

/// Point-in-time copy of `CaptureStats`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureCounts {
    pub launched: u64,
    pub sent: u64,
    pub encode_failures: u64,
    pub transmit_failures: u64,
    /// Captures that never started because their thread could not be spawned.
    pub spawn_failures: u64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureCounts {
        CaptureCounts {
            launched: self.launched.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            transmit_failures: self.transmit_failures.load(Ordering::Relaxed),
            spawn_failures: self.spawn_failures.load(Ordering::Relaxed),
        }
    }
}

impl CaptureCounts {
    /// Captures that have finished, successfully or not.
    pub fn finished(&self) -> u64 {
        self.sent + self.encode_failures + self.transmit_failures + self.spawn_failures
    }
}

/// Crop, encode, and transmit one capture per eligible identity.
///
/// Each launch runs on its own detached thread. Failures are logged and
/// counted; they never reach the tracker, and nothing is retried.
#[derive(Clone)]
pub struct CapturePipeline {
    codec: Arc<dyn FrameCodec>,
    transport: Arc<dyn CollectorTransport>,
    stats: Arc<CaptureStats>,
}

impl CapturePipeline {
    pub fn new(codec: Arc<dyn FrameCodec>, transport: Arc<dyn CollectorTransport>) -> Self {
        Self {
            codec,
            transport,
            stats: Arc::new(CaptureStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    /// Start a capture without waiting for it.
    ///
    /// The handle may be dropped; tests join it to observe completion.
    pub fn launch(&self, request: CaptureRequest) -> Option<JoinHandle<()>> {
        self.stats.launched.fetch_add(1, Ordering::Relaxed);
        let pipeline = self.clone();
        let identity = request.identity;
        let spawned = std::thread::Builder::new()
            .name(format!("capture-{}", identity))
            .spawn(move || match pipeline.run(&request) {
                Ok(bytes) => log::info!(
                    "capture {}: sent {} bytes to {}",
                    request.identity,
                    bytes,
                    pipeline.transport.describe()
                ),
                Err(err) => log::warn!("capture {} dropped: {:#}", request.identity, err),
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                self.stats.spawn_failures.fetch_add(1, Ordering::Relaxed);
                log::error!("capture {}: failed to spawn thread: {}", identity, err);
                None
            }
        }
    }

    /// Run a capture on the calling thread. Returns the payload size sent.
    pub fn run(&self, request: &CaptureRequest) -> Result<usize> {
        let frame = &request.frame;
        let payload = request
            .region
            .clamp_to(frame.width, frame.height)
            .ok_or_else(|| {
                anyhow!(
                    "box {:?} lies outside {}x{} frame",
                    request.region,
                    frame.width,
                    frame.height
                )
            })
            .and_then(|region| self.codec.encode(frame, &region));
        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                self.stats.encode_failures.fetch_add(1, Ordering::Relaxed);
                return Err(err.context(format!("{} encode", self.codec.name())));
            }
        };

        if let Err(err) = self.transport.send(&payload) {
            self.stats.transmit_failures.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        Ok(payload.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use std::sync::Mutex;

    struct EchoCodec;

    impl FrameCodec for EchoCodec {
        fn encode(&self, _frame: &Frame, region: &BoundingBox) -> Result<Vec<u8>> {
            Ok(format!("{},{},{},{}", region.x, region.y, region.width, region.height).into_bytes())
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct FailingCodec;

    impl FrameCodec for FailingCodec {
        fn encode(&self, _frame: &Frame, _region: &BoundingBox) -> Result<Vec<u8>> {
            Err(anyhow!("encoder unavailable"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    impl CollectorTransport for RecordingTransport {
        fn send(&self, payload: &[u8]) -> Result<()> {
            if self.fail {
                return Err(anyhow!("connection refused"));
            }
            self.sent.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    fn request(region: BoundingBox) -> CaptureRequest {
        let frame = Frame::new(vec![0u8; 100 * 80 * 3], 100, 80, PixelFormat::Rgb8, 7).unwrap();
        CaptureRequest {
            identity: 3,
            region,
            frame,
        }
    }

    #[test]
    fn region_is_clamped_before_encoding() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = CapturePipeline::new(Arc::new(EchoCodec), transport.clone());

        let handle = pipeline
            .launch(request(BoundingBox::new(90, 70, 40, 40)))
            .expect("spawn");
        handle.join().unwrap();

        assert_eq!(*transport.sent.lock().unwrap(), vec![b"90,70,10,10".to_vec()]);
        let counts = pipeline.stats().snapshot();
        assert_eq!(counts.launched, 1);
        assert_eq!(counts.sent, 1);
        assert_eq!(counts.finished(), 1);
    }

    #[test]
    fn encode_failure_is_counted_and_not_sent() {
        let transport = Arc::new(RecordingTransport::default());
        let pipeline = CapturePipeline::new(Arc::new(FailingCodec), transport.clone());

        assert!(pipeline.run(&request(BoundingBox::new(0, 0, 10, 10))).is_err());
        assert!(pipeline.run(&request(BoundingBox::new(500, 500, 10, 10))).is_err());
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(pipeline.stats().snapshot().encode_failures, 2);
    }

    #[test]
    fn transmit_failure_is_counted() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..RecordingTransport::default()
        });
        let pipeline = CapturePipeline::new(Arc::new(EchoCodec), transport);

        pipeline
            .launch(request(BoundingBox::new(0, 0, 10, 10)))
            .expect("spawn")
            .join()
            .unwrap();
        let counts = pipeline.stats().snapshot();
        assert_eq!(counts.transmit_failures, 1);
        assert_eq!(counts.sent, 0);
        assert_eq!(counts.spawn_failures, 0);
    }

    #[test]
    fn spawn_failures_are_finished_but_not_transmit_failures() {
        let stats = CaptureStats::default();
        stats.launched.fetch_add(2, Ordering::Relaxed);
        stats.sent.fetch_add(1, Ordering::Relaxed);
        stats.spawn_failures.fetch_add(1, Ordering::Relaxed);

        let counts = stats.snapshot();
        assert_eq!(counts.spawn_failures, 1);
        assert_eq!(counts.transmit_failures, 0);
        assert_eq!(counts.finished(), counts.launched);
    }
}
