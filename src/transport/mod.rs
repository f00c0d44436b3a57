//! Transport to the remote collector.
//!
//! Wire format, one payload per connection:
//!
//! ```text
//! +----------------------+---------------------+
//! | length: u32 (BE)     | payload: length B   |
//! +----------------------+---------------------+
//! ```
//!
//! The sender closes the connection after the payload. Nothing is read back.

mod tcp;

use anyhow::{anyhow, Context, Result};
use std::io::{ErrorKind, Read, Write};

pub use tcp::{parse_collector_endpoint, CollectorEndpoint, TcpCollector};

/// Largest payload a collector accepts by default.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Delivers one encoded capture to the collector.
pub trait CollectorTransport: Send + Sync {
    /// Send `payload` as a single length-prefixed message.
    fn send(&self, payload: &[u8]) -> Result<()>;

    /// Human-readable destination for log lines.
    fn describe(&self) -> String;
}

/// Write the length prefix followed by the payload.
pub fn write_payload<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow!("payload of {} bytes exceeds u32 length prefix", payload.len()))?;
    writer
        .write_all(&len.to_be_bytes())
        .context("write length prefix")?;
    writer.write_all(payload).context("write payload")?;
    writer.flush().context("flush payload")?;
    Ok(())
}

/// Read one length-prefixed payload.
///
/// Fails if the prefix is short, the announced length exceeds `max_len`, or
/// the stream ends before the full payload arrives.
pub fn read_payload<R: Read>(reader: &mut R, max_len: usize) -> Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader
        .read_exact(&mut prefix)
        .map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => anyhow!("connection closed before length prefix"),
            _ => anyhow!("read length prefix: {}", e),
        })?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(anyhow!(
            "announced payload of {} bytes exceeds limit of {}",
            len,
            max_len
        ));
    }

    let mut payload = Vec::with_capacity(len);
    let read = (&mut *reader)
        .take(len as u64)
        .read_to_end(&mut payload)
        .context("read payload")?;
    if read != len {
        return Err(anyhow!("incomplete payload: got {} of {} bytes", read, len));
    }
    Ok(payload)
}
