//! TCP relay for SOCKS5 CONNECT command
//!
//! Destinations on private or loopback addresses may be dialled directly when
//! bypass is enabled. Everything else goes through a logical stream of the
//! shared tunnel with the payload transforms applied per direction.

use crate::context::ProxyContext;
use crate::error::{Result, VeilError};
use crate::helper::is_private_or_loopback;
use crate::pool::{BufferPool, TrafficStats};
use crate::protocol::{Network, PaddingCodec, Pipeline};
use crate::socks::command::{build_reply, parse_connect_target};
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use crate::tunnel::Tunnel;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

/// CONNECT handler bound to one tunnel
pub struct TcpProxy {
    tunnel: Arc<Tunnel>,
    pipeline: Pipeline,
    bypass: bool,
    connect_timeout: Duration,
    buffers: BufferPool,
    stats: Arc<TrafficStats>,
}

impl TcpProxy {
    /// Create a proxy sharing `tunnel`
    pub fn new(tunnel: Arc<Tunnel>, ctx: &ProxyContext) -> Self {
        TcpProxy {
            tunnel,
            pipeline: ctx.pipeline(),
            bypass: ctx.config.bypass,
            connect_timeout: ctx.timeout(),
            buffers: ctx.buffers.clone(),
            stats: ctx.stats.clone(),
        }
    }

    /// The tunnel this proxy opens streams on
    pub fn tunnel(&self) -> &Arc<Tunnel> {
        &self.tunnel
    }

    /// Serve one CONNECT command frame on `client`
    ///
    /// A frame that does not parse drops the connection without a reply.
    pub async fn proxy<S>(&self, mut client: S, command: &[u8]) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let target = parse_connect_target(command)?;

        if self.bypass {
            if let TargetAddr::Ip(addr) = &target {
                if is_private_or_loopback(addr.ip()) {
                    debug!("Bypassing tunnel for {}", addr);
                    return handle_tcp_connect(client, target, self.connect_timeout).await;
                }
            }
        }

        let host = target.host();
        let port = target.port().to_string();
        let stream = match self.tunnel.open_stream(Network::Tcp, &host, &port).await {
            Ok(stream) => stream,
            Err(e) => {
                build_reply(&mut client, SOCKS5_REPLY_CONNECTION_REFUSED, None).await?;
                return Err(e);
            }
        };

        build_reply(&mut client, SOCKS5_REPLY_SUCCEEDED, None).await?;
        info!("SOCKS5 tunnel established to {}", target);

        self.relay(client, stream).await;
        Ok(())
    }

    /// Relay `client` and `stream` until either direction stops
    pub async fn relay<A, B>(&self, client: A, stream: B)
    where
        A: AsyncRead + AsyncWrite + Unpin,
        B: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut client_r, mut client_w) = tokio::io::split(client);
        let (stream_r, mut stream_w) = tokio::io::split(stream);

        let to_server = async {
            let mut buf = self.buffers.get();
            loop {
                let n = client_r.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                let wire = self.pipeline.seal(&mut buf[..n])?;
                stream_w.write_all(&wire).await?;
                self.stats.record_written(n);
            }
            Ok::<_, VeilError>(())
        };

        let to_client = async {
            if self.pipeline.padding {
                let mut frames = FramedRead::new(stream_r, PaddingCodec);
                while let Some(frame) = frames.next().await {
                    let mut frame = frame?;
                    let data = self.pipeline.open(&mut frame)?;
                    client_w.write_all(&data).await?;
                    self.stats.record_read(data.len());
                }
            } else {
                let mut stream_r = stream_r;
                let mut buf = self.buffers.get();
                loop {
                    let n = stream_r.read(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    let data = self.pipeline.open(&mut buf[..n])?;
                    client_w.write_all(&data).await?;
                    self.stats.record_read(data.len());
                }
            }
            Ok::<_, VeilError>(())
        };

        tokio::select! {
            result = to_server => {
                match result {
                    Ok(()) => debug!("client->stream finished"),
                    Err(e) => debug!("client->stream error: {}", e),
                }
            }
            result = to_client => {
                match result {
                    Ok(()) => debug!("stream->client finished"),
                    Err(e) => debug!("stream->client error: {}", e),
                }
            }
        }
    }
}

/// Connect directly to `target_addr` and relay without transforms
pub async fn handle_tcp_connect<S>(
    mut client_stream: S,
    target_addr: TargetAddr,
    connect_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let socket_addr = target_addr.resolve().await?;

    debug!("Connecting to target: {}", socket_addr);

    let target_stream =
        match tokio::time::timeout(connect_timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", socket_addr, e);
                build_reply(&mut client_stream, io_error_to_reply_code(&e), None).await?;
                return Err(e.into());
            }
            Err(_) => {
                error!("Connection timeout to {}", socket_addr);
                build_reply(&mut client_stream, SOCKS5_REPLY_HOST_UNREACHABLE, None).await?;
                return Err(VeilError::Timeout(format!("connecting to {}", socket_addr)));
            }
        };

    let local_addr = target_stream.local_addr().ok();
    build_reply(&mut client_stream, SOCKS5_REPLY_SUCCEEDED, local_addr).await?;

    info!("Direct connection established to {}", socket_addr);

    relay_tcp(client_stream, target_stream).await;
    Ok(())
}

/// Copy bytes both ways until either direction ends
pub async fn relay_tcp<A, B>(a: A, b: B)
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let a_to_b = tokio::io::copy(&mut a_read, &mut b_write);
    let b_to_a = tokio::io::copy(&mut b_read, &mut a_write);

    tokio::select! {
        result = a_to_b => {
            if let Err(e) = result {
                warn!("Direct relay error: {}", e);
            }
        }
        result = b_to_a => {
            if let Err(e) = result {
                warn!("Direct relay error: {}", e);
            }
        }
    }
}

/// Convert IO error to SOCKS5 reply code
fn io_error_to_reply_code(error: &std::io::Error) -> u8 {
    match error.kind() {
        std::io::ErrorKind::ConnectionRefused => SOCKS5_REPLY_CONNECTION_REFUSED,
        std::io::ErrorKind::TimedOut => SOCKS5_REPLY_HOST_UNREACHABLE,
        std::io::ErrorKind::AddrNotAvailable => SOCKS5_REPLY_HOST_UNREACHABLE,
        std::io::ErrorKind::PermissionDenied => SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
        _ => SOCKS5_REPLY_GENERAL_FAILURE,
    }
}
