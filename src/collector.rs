//! Receiving side of the capture wire protocol.
//!
//! The collector accepts one connection per capture, reads a single
//! length-prefixed payload, and hands it to a handler. Connections are served
//! one at a time on the accept thread; nothing is written back.

use anyhow::{anyhow, Context, Result};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::transport::{read_payload, DEFAULT_MAX_PAYLOAD_BYTES};

const ACCEPT_POLL: Duration = Duration::from_millis(20);

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub bind: String,
    pub max_payload_bytes: usize,
    pub read_timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:12345".to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            read_timeout: Duration::from_secs(10),
        }
    }
}

/// Called once per complete payload with a running sequence number.
pub trait PayloadHandler: Send + 'static {
    fn handle(&mut self, seq: u64, payload: Vec<u8>) -> Result<()>;
}

impl<F> PayloadHandler for F
where
    F: FnMut(u64, Vec<u8>) -> Result<()> + Send + 'static,
{
    fn handle(&mut self, seq: u64, payload: Vec<u8>) -> Result<()> {
        self(seq, payload)
    }
}

/// Writes each payload to `<dir>/capture_<seq>.jpg`.
#[derive(Clone, Debug)]
pub struct DirectoryWriter {
    dir: PathBuf,
}

impl DirectoryWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("capture_{:06}.jpg", seq))
    }
}

impl PayloadHandler for DirectoryWriter {
    fn handle(&mut self, seq: u64, payload: Vec<u8>) -> Result<()> {
        let path = self.path_for(seq);
        std::fs::write(&path, &payload).with_context(|| format!("write {}", path.display()))?;
        log::info!("saved {} bytes to {}", payload.len(), path.display());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CollectorStats {
    received: AtomicU64,
    rejected: AtomicU64,
}

impl CollectorStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct CollectorHandle {
    pub addr: SocketAddr,
    stats: Arc<CollectorStats>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl CollectorHandle {
    pub fn stats(&self) -> Arc<CollectorStats> {
        self.stats.clone()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("collector thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

pub struct CollectorServer {
    cfg: CollectorConfig,
}

impl CollectorServer {
    pub fn new(cfg: CollectorConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn<H: PayloadHandler>(self, handler: H) -> Result<CollectorHandle> {
        let listener = TcpListener::bind(&self.cfg.bind)
            .with_context(|| format!("bind collector on {}", self.cfg.bind))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(CollectorStats::default());
        let shutdown_thread = shutdown.clone();
        let stats_thread = stats.clone();
        let cfg = self.cfg;
        let join = std::thread::Builder::new()
            .name("collector".to_string())
            .spawn(move || {
                if let Err(err) = run_collector(listener, &cfg, handler, &stats_thread, &shutdown_thread)
                {
                    log::error!("collector stopped: {:#}", err);
                }
            })?;

        Ok(CollectorHandle {
            addr,
            stats,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_collector<H: PayloadHandler>(
    listener: TcpListener,
    cfg: &CollectorConfig,
    mut handler: H,
    stats: &CollectorStats,
    shutdown: &AtomicBool,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => match receive_one(stream, cfg) {
                Ok(payload) => {
                    let seq = stats.received.fetch_add(1, Ordering::Relaxed);
                    log::info!("received {} bytes from {}", payload.len(), peer);
                    if let Err(err) = handler.handle(seq, payload) {
                        log::warn!("payload {} from {} not stored: {:#}", seq, peer, err);
                    }
                }
                Err(err) => {
                    stats.rejected.fetch_add(1, Ordering::Relaxed);
                    log::warn!("connection from {} rejected: {:#}", peer, err);
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn receive_one(mut stream: TcpStream, cfg: &CollectorConfig) -> Result<Vec<u8>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(cfg.read_timeout))?;
    read_payload(&mut stream, cfg.max_payload_bytes)
}
