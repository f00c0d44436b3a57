//! collector - receive dwell captures and store them on disk.
//!
//! Listens for length-prefixed JPEG payloads (one per connection) and writes
//! each complete payload to the output directory.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use dwell_tracker::collector::{CollectorConfig, CollectorServer, DirectoryWriter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Receive dwell captures over TCP")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "DWELL_COLLECTOR_BIND", default_value = "0.0.0.0:12345")]
    bind: String,

    /// Directory for received captures.
    #[arg(long, env = "DWELL_COLLECTOR_OUT", default_value = "captures")]
    out_dir: PathBuf,

    /// Largest accepted payload in bytes.
    #[arg(long, default_value_t = dwell_tracker::transport::DEFAULT_MAX_PAYLOAD_BYTES)]
    max_payload_bytes: usize,

    /// Per-connection read timeout in seconds.
    #[arg(long, default_value_t = 10)]
    read_timeout_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let writer = DirectoryWriter::new(&args.out_dir)?;
    let cfg = CollectorConfig {
        bind: args.bind,
        max_payload_bytes: args.max_payload_bytes,
        read_timeout: Duration::from_secs(args.read_timeout_secs),
    };
    let handle = CollectorServer::new(cfg).spawn(writer)?;
    log::info!(
        "collector listening on {}; writing to {}",
        handle.addr,
        args.out_dir.display()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");
    let _ = rx.recv();

    let stats = handle.stats();
    log::info!(
        "shutting down: {} received, {} rejected",
        stats.received(),
        stats.rejected()
    );
    handle.stop()?;
    Ok(())
}
