use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::capture::DEFAULT_JPEG_QUALITY;
use crate::detect::{
    DetectorSettings, DEFAULT_LUMA_THRESHOLD, DEFAULT_MAX_OBJECT_SIZE, DEFAULT_MIN_OBJECT_SIZE,
};
use crate::ingest::{SourceConfig, MAX_SOURCE_DIMENSION};
use crate::tracker::{TrackerSettings, DEFAULT_IOU_THRESHOLD};
use crate::transport::CollectorEndpoint;

const DEFAULT_COLLECTOR_HOST: &str = "127.0.0.1";
const DEFAULT_COLLECTOR_PORT: u16 = 12345;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CAPTURE_THRESHOLD_SECS: f64 = 3.0;
const DEFAULT_DETECTOR: &str = "luma";
const DEFAULT_SOURCE_URL: &str = "stub://synthetic";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct DwellConfigFile {
    collector: Option<CollectorConfigFile>,
    tracking: Option<TrackingConfigFile>,
    detector: Option<DetectorConfigFile>,
    source: Option<SourceConfigFile>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CollectorConfigFile {
    host: Option<String>,
    port: Option<u16>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    capture_threshold_secs: Option<f64>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    min_object_size: Option<u32>,
    max_object_size: Option<u32>,
    luma_threshold: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct DwellConfig {
    pub collector: CollectorSettings,
    pub tracking: TrackingSettings,
    pub detector: DetectorConfig,
    pub source: SourceConfig,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub capture_threshold_secs: f64,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub backend: String,
    pub min_object_size: u32,
    pub max_object_size: u32,
    pub luma_threshold: u8,
}

impl DwellConfig {
    /// Load from `DWELL_CONFIG` (if set), then apply `DWELL_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DWELL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DwellConfigFile) -> Self {
        let collector = file.collector.unwrap_or_default();
        let tracking = file.tracking.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();

        Self {
            collector: CollectorSettings {
                host: collector
                    .host
                    .unwrap_or_else(|| DEFAULT_COLLECTOR_HOST.to_string()),
                port: collector.port.unwrap_or(DEFAULT_COLLECTOR_PORT),
                connect_timeout: Duration::from_millis(
                    collector
                        .connect_timeout_ms
                        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
                ),
                write_timeout: Duration::from_millis(
                    collector
                        .write_timeout_ms
                        .unwrap_or(DEFAULT_WRITE_TIMEOUT_MS),
                ),
            },
            tracking: TrackingSettings {
                capture_threshold_secs: tracking
                    .capture_threshold_secs
                    .unwrap_or(DEFAULT_CAPTURE_THRESHOLD_SECS),
                iou_threshold: tracking.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            },
            detector: DetectorConfig {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
                min_object_size: detector.min_object_size.unwrap_or(DEFAULT_MIN_OBJECT_SIZE),
                max_object_size: detector.max_object_size.unwrap_or(DEFAULT_MAX_OBJECT_SIZE),
                luma_threshold: detector.luma_threshold.unwrap_or(DEFAULT_LUMA_THRESHOLD),
            },
            source: SourceConfig {
                url: source
                    .url
                    .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            },
            jpeg_quality: capture.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("DWELL_COLLECTOR_HOST") {
            if !host.trim().is_empty() {
                self.collector.host = host.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("DWELL_COLLECTOR_PORT") {
            self.collector.port = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("DWELL_COLLECTOR_PORT must be a port number"))?;
        }
        if let Ok(secs) = std::env::var("DWELL_CAPTURE_THRESHOLD_SECS") {
            self.tracking.capture_threshold_secs = secs
                .trim()
                .parse()
                .map_err(|_| anyhow!("DWELL_CAPTURE_THRESHOLD_SECS must be a number of seconds"))?;
        }
        if let Ok(iou) = std::env::var("DWELL_IOU_THRESHOLD") {
            self.tracking.iou_threshold = iou
                .trim()
                .parse()
                .map_err(|_| anyhow!("DWELL_IOU_THRESHOLD must be a number"))?;
        }
        if let Ok(backend) = std::env::var("DWELL_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(size) = std::env::var("DWELL_MIN_OBJECT_SIZE") {
            self.detector.min_object_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("DWELL_MIN_OBJECT_SIZE must be an integer"))?;
        }
        if let Ok(size) = std::env::var("DWELL_MAX_OBJECT_SIZE") {
            self.detector.max_object_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("DWELL_MAX_OBJECT_SIZE must be an integer"))?;
        }
        if let Ok(url) = std::env::var("DWELL_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url.trim().to_string();
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.collector.host.trim().is_empty() {
            return Err(anyhow!("collector host must not be empty"));
        }
        if self.collector.port == 0 {
            return Err(anyhow!("collector port must be greater than zero"));
        }
        let secs = self.tracking.capture_threshold_secs;
        if Duration::try_from_secs_f64(secs).is_err() {
            return Err(anyhow!(
                "capture threshold must be a non-negative number of seconds, got {}",
                secs
            ));
        }
        let iou = self.tracking.iou_threshold;
        if !(0.0..1.0).contains(&iou) {
            return Err(anyhow!("iou threshold must be in [0, 1), got {}", iou));
        }
        for (name, value) in [("width", self.source.width), ("height", self.source.height)] {
            if !(1..=MAX_SOURCE_DIMENSION).contains(&value) {
                return Err(anyhow!(
                    "source {} must be in 1..={}, got {}",
                    name,
                    MAX_SOURCE_DIMENSION,
                    value
                ));
            }
        }
        if self.detector.min_object_size > self.detector.max_object_size {
            return Err(anyhow!(
                "min object size {} exceeds max object size {}",
                self.detector.min_object_size,
                self.detector.max_object_size
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!(
                "jpeg quality must be in 1..=100, got {}",
                self.jpeg_quality
            ));
        }
        Ok(())
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            // Out-of-range values are rejected by `validate`; saturate otherwise.
            capture_threshold: Duration::try_from_secs_f64(self.tracking.capture_threshold_secs)
                .unwrap_or(Duration::MAX),
            iou_threshold: self.tracking.iou_threshold,
        }
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            min_object_size: self.detector.min_object_size,
            max_object_size: self.detector.max_object_size,
        }
    }

    pub fn collector_endpoint(&self) -> CollectorEndpoint {
        CollectorEndpoint {
            host: self.collector.host.clone(),
            port: self.collector.port,
        }
    }
}

fn read_config_file(path: &Path) -> Result<DwellConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
