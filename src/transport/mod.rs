//! Transport module for Veilsocks
//!
//! Produces the single physical byte stream that a multiplexed session is
//! layered on: plain TCP, or a WebSocket upgrade over TCP or TLS.

mod addr;
mod mux;
mod tcp;
#[cfg(feature = "rustls-tls")]
mod tls;
mod websocket;

pub use addr::AddrMaybeCached;
pub use mux::{MuxSession, SessionFactory, TransportSessionFactory, YamuxSession};
pub use tcp::TcpTransport;
#[cfg(feature = "rustls-tls")]
pub use tls::TlsTransport;
pub use websocket::{websocket_upgrade, WebSocketTransport};

use crate::config::{Config, TransportType};
use crate::error::{Result, VeilError};
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Socket options for the long-lived session connection
    pub fn for_session() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(30),
            keepalive_interval: Some(10),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Transport trait for different connection types
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// The stream type produced by this transport
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Create a new transport instance from configuration
    fn new(config: &Config) -> Result<Self>
    where
        Self: Sized;

    /// Connect to a remote address
    async fn connect(&self, addr: &AddrMaybeCached) -> Result<Self::Stream>;
}

/// Dynamic transport trait for boxed transports
#[async_trait]
pub trait TransportDyn: Debug + Send + Sync {
    /// Connect to a remote address and return a boxed stream
    async fn connect_dyn(&self, addr: &AddrMaybeCached) -> Result<Box<dyn StreamDyn>>;
}

#[async_trait]
impl<T: Transport> TransportDyn for T {
    async fn connect_dyn(&self, addr: &AddrMaybeCached) -> Result<Box<dyn StreamDyn>> {
        let stream = self.connect(addr).await?;
        Ok(Box::new(stream))
    }
}

/// Dynamic stream trait for boxed streams
pub trait StreamDyn: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamDyn for T {}

/// Create a transport based on configuration
pub fn create_transport(config: &Config) -> Result<Box<dyn TransportDyn>> {
    match config.protocol {
        TransportType::Tcp => Ok(Box::new(TcpTransport::new(config)?)),
        TransportType::Ws | TransportType::Wss => Ok(Box::new(WebSocketTransport::new(config)?)),
        TransportType::Kcp => Err(VeilError::Config(
            "the kcp transport is not supported".to_string(),
        )),
    }
}
