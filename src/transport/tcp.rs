//! TCP transport implementation
//!
//! Provides plain TCP connections to the remote endpoint.

use super::{AddrMaybeCached, SocketOpts, Transport};
use crate::config::Config;
use crate::error::{Result, VeilError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP transport for plain connections
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a new TCP transport with default options
    pub fn with_defaults() -> Self {
        TcpTransport {
            socket_opts: SocketOpts::for_session(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    fn new(config: &Config) -> Result<Self> {
        Ok(TcpTransport::with_defaults()
            .with_connect_timeout(Duration::from_secs(config.timeout_secs)))
    }

    async fn connect(&self, addr: &AddrMaybeCached) -> Result<Self::Stream> {
        let resolved = addr.resolve().await?;

        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(resolved))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                addr.clear_cache().await;
                return Err(VeilError::Transport(format!(
                    "failed to connect to {}: {}",
                    addr, e
                )));
            }
            Err(_) => {
                addr.clear_cache().await;
                return Err(VeilError::Timeout(format!("connecting to {}", addr)));
            }
        };

        if let Err(e) = self.socket_opts.apply(&stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }

        tracing::debug!("TCP connection established to {}", resolved);

        Ok(stream)
    }
}
