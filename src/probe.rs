//! Reachability probe: does any of a host's ports accept a TCP connection?

use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Answers whether at least one port of a host is reachable.
///
/// Ordinary connection failures are a `false` answer, never an error. An
/// error means the probe was misused or broke internally; the caller treats
/// it as a fault.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, host: &str, ports: &[u16]) -> Result<bool>;
}

/// TCP connect probe, bounded per port
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, host: &str, ports: &[u16]) -> Result<bool> {
        let host = host.trim();
        if host.is_empty() {
            bail!("cannot probe an empty host name");
        }
        if ports.is_empty() {
            bail!("no ports given for {host}");
        }

        for &port in ports {
            // name resolution happens inside the timeout as well
            match timeout(self.timeout, TcpStream::connect((host, port))).await {
                Ok(Ok(_stream)) => {
                    trace!("{host}:{port} accepted connection");
                    return Ok(true);
                }
                Ok(Err(e)) => trace!("{host}:{port} refused: {e}"),
                Err(_) => trace!("{host}:{port} timed out after {:?}", self.timeout),
            }
        }

        Ok(false)
    }
}
