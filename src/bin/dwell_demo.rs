//! dwell_demo - end-to-end synthetic run
//!
//! Starts a loopback collector, runs the synthetic source through the luma
//! detector and the tracker, and reports what the collector received.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dwell_tracker::collector::{CollectorConfig, CollectorServer, DirectoryWriter};
use dwell_tracker::transport::parse_collector_endpoint;
use dwell_tracker::{
    CapturePipeline, DetectorSettings, JpegCodec, LumaBlobBackend, SourceConfig, TcpCollector,
    TrackerSettings, TrackingWorker,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration of the run in seconds.
    #[arg(long, default_value_t = 15)]
    seconds: u64,
    /// Frames per second for the synthetic source.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Dwell time before capture, in seconds.
    #[arg(long, default_value_t = 3.0)]
    dwell: f64,
    /// Output directory for received captures.
    #[arg(long, default_value = "demo_out")]
    out: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let capture_threshold = Duration::try_from_secs_f64(args.dwell).map_err(|_| {
        anyhow!(
            "--dwell must be a non-negative number of seconds, got {}",
            args.dwell
        )
    })?;

    let collector = CollectorServer::new(CollectorConfig {
        bind: "127.0.0.1:0".to_string(),
        ..CollectorConfig::default()
    })
    .spawn(DirectoryWriter::new(&args.out)?)?;
    log::info!("demo collector on {}", collector.addr);

    let endpoint = parse_collector_endpoint(&collector.addr.to_string())?;
    let pipeline = CapturePipeline::new(
        Arc::new(JpegCodec::default()),
        Arc::new(TcpCollector::new(endpoint)),
    );
    let capture_stats = pipeline.stats();

    let source = dwell_tracker::open_source(SourceConfig {
        url: "stub://demo".to_string(),
        target_fps: args.fps,
        ..SourceConfig::default()
    })?;
    let detector = LumaBlobBackend::new(DetectorSettings::default(), 200);
    let settings = TrackerSettings {
        capture_threshold,
        ..TrackerSettings::default()
    };
    let handle = TrackingWorker::new(source, Box::new(detector), settings, pipeline).spawn()?;

    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(args.seconds) {
        std::thread::sleep(Duration::from_secs(1));
        log::info!(
            "t={:>3}s tracking={} boxes={:?}",
            started.elapsed().as_secs(),
            handle.is_tracking(),
            handle.latest_boxes()
        );
    }
    handle.stop()?;

    // Give in-flight captures a moment to land.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let counts = capture_stats.snapshot();
        if counts.finished() >= counts.launched || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    let counts = capture_stats.snapshot();
    let stats = collector.stats();
    println!(
        "captures launched={} sent={} failed={} | collector received={} rejected={} -> {}",
        counts.launched,
        counts.sent,
        counts.encode_failures + counts.transmit_failures,
        stats.received(),
        stats.rejected(),
        args.out.display()
    );
    collector.stop()?;
    Ok(())
}
