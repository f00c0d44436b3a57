//! TCP transport to the collector.
//!
//! Every send opens a fresh connection, writes one length-prefixed payload,
//! and shuts the connection down. Connect and write are bounded by timeouts
//! so a stalled collector cannot pin capture threads indefinitely.

use anyhow::{anyhow, Context, Result};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{write_payload, CollectorTransport};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Collector host and port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorEndpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for CollectorEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse `host:port`, `[v6]:port`, or `tcp://host:port`.
pub fn parse_collector_endpoint(addr: &str) -> Result<CollectorEndpoint> {
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        if scheme != "tcp" {
            return Err(anyhow!("unsupported collector scheme: {}", scheme));
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing collector host in {}", addr));
    }
    if port == 0 {
        return Err(anyhow!("collector port must be non-zero in {}", addr));
    }
    Ok(CollectorEndpoint { host, port })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    // Handle IPv6 addresses in brackets: [::1]:12345
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid collector address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing collector port in {}", addr))?;
        let port: u16 = port
            .parse()
            .with_context(|| format!("invalid collector port in {}", addr))?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing collector port in {}", addr))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid collector port in {}", addr))?;
    Ok((host.to_string(), port))
}

/// One-connection-per-payload TCP sender.
#[derive(Clone, Debug)]
pub struct TcpCollector {
    endpoint: CollectorEndpoint,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpCollector {
    pub fn new(endpoint: CollectorEndpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, write_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.write_timeout = write_timeout;
        self
    }

    pub fn endpoint(&self) -> &CollectorEndpoint {
        &self.endpoint
    }

    fn connect(&self) -> Result<TcpStream> {
        let addrs: Vec<SocketAddr> = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()
            .with_context(|| format!("resolve collector {}", self.endpoint))?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        Err(match last_err {
            Some(err) => anyhow!("connect to collector {}: {}", self.endpoint, err),
            None => anyhow!("collector {} resolved to no addresses", self.endpoint),
        })
    }
}

impl CollectorTransport for TcpCollector {
    fn send(&self, payload: &[u8]) -> Result<()> {
        let mut stream = self.connect()?;
        stream
            .set_write_timeout(Some(self.write_timeout))
            .context("set collector write timeout")?;
        stream.set_nodelay(true).ok();

        let result = write_payload(&mut stream, payload)
            .with_context(|| format!("send to collector {}", self.endpoint));
        // Close regardless of the write outcome.
        let _ = stream.shutdown(Shutdown::Both);
        result
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::read_payload;
    use std::net::TcpListener;

    #[test]
    fn parse_endpoint_plain() {
        let ep = parse_collector_endpoint("192.168.1.66:12345").unwrap();
        assert_eq!(ep.host, "192.168.1.66");
        assert_eq!(ep.port, 12345);
        assert_eq!(ep.to_string(), "192.168.1.66:12345");
    }

    #[test]
    fn parse_endpoint_scheme_and_ipv6() {
        let ep = parse_collector_endpoint("tcp://[::1]:9000").unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 9000);
        assert_eq!(ep.to_string(), "[::1]:9000");
    }

    #[test]
    fn parse_endpoint_invalid() {
        assert!(parse_collector_endpoint("localhost").is_err());
        assert!(parse_collector_endpoint("localhost:0").is_err());
        assert!(parse_collector_endpoint(":12345").is_err());
        assert!(parse_collector_endpoint("udp://localhost:1").is_err());
        assert!(parse_collector_endpoint("localhost:http").is_err());
    }

    #[test]
    fn send_delivers_one_payload_per_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let receiver = std::thread::spawn(move || {
            let mut got = Vec::new();
            for _ in 0..2 {
                let (mut stream, _) = listener.accept().unwrap();
                got.push(read_payload(&mut stream, 1024).unwrap());
            }
            got
        });

        let collector = TcpCollector::new(CollectorEndpoint {
            host: "127.0.0.1".to_string(),
            port,
        });
        collector.send(b"first").unwrap();
        collector.send(b"second").unwrap();

        let got = receiver.join().unwrap();
        assert_eq!(got, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn send_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let collector = TcpCollector::new(CollectorEndpoint {
            host: "127.0.0.1".to_string(),
            port,
        })
        .with_timeouts(Duration::from_millis(500), Duration::from_millis(500));
        assert!(collector.send(b"payload").is_err());
    }
}
