//! dwelld - dwell-time capture daemon
//!
//! This daemon:
//! 1. Pulls frames from the configured source
//! 2. Runs the configured detector on each frame
//! 3. Tracks identities across frames
//! 4. Sends one JPEG crop per identity that dwells past the threshold
//! 5. Stops cleanly on Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::sync::mpsc;
use std::time::Duration;

use dwell_tracker::config::DwellConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track objects and capture those that dwell")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "DWELL_CONFIG")]
    config: Option<String>,

    /// Seconds between status lines.
    #[arg(long, default_value_t = 10)]
    status_interval: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(path) = &args.config {
        std::env::set_var("DWELL_CONFIG", path);
    }
    let cfg = DwellConfig::load()?;
    log::info!(
        "collector={} source={} detector={} capture_after={:.1}s",
        cfg.collector_endpoint(),
        cfg.source.url,
        cfg.detector.backend,
        cfg.tracking.capture_threshold_secs
    );

    let worker = dwell_tracker::build_worker(&cfg)?;
    let handle = worker.spawn()?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("dwelld running; waiting for shutdown signal (Ctrl-C)...");
    let status_interval = Duration::from_secs(args.status_interval.max(1));
    loop {
        match rx.recv_timeout(status_interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let counters = handle.counters();
                log::info!(
                    "tracking={} boxes={:?} frames={} captures={}",
                    handle.is_tracking(),
                    handle.latest_boxes(),
                    counters.frames_processed(),
                    counters.captures_launched()
                );
                if !handle.is_running() {
                    log::error!("tracking worker exited unexpectedly");
                    break;
                }
            }
        }
    }

    log::info!("shutdown signal received, stopping tracking worker...");
    handle.stop()?;
    Ok(())
}
