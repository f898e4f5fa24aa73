//! SOCKS5 front-end
//!
//! Negotiates "no authentication required", reads one command frame and
//! hands the connection to the CONNECT or UDP ASSOCIATE path.

use crate::error::{Result, Socks5Error, VeilError};
use crate::socks::command::{build_reply, send_no_auth};
use crate::socks::consts::*;
use crate::socks::tcp_relay::TcpProxy;
use crate::socks::types::SocksCommand;
use crate::socks::udp::handle_udp_associate;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, warn};

/// Read the greeting and answer with "no authentication required"
///
/// A greeting for any other SOCKS version ends the connection without a
/// response.
pub async fn check_version<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let n = stream.read(buf).await?;
    if n == 0 {
        return Err(VeilError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }
    if buf[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(buf[0]).into());
    }
    send_no_auth(stream).await
}

/// Read one command frame and run the matching command
pub async fn dispatch<S>(
    mut stream: S,
    buf: &mut [u8],
    tcp: &TcpProxy,
    udp_bind: SocketAddr,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let n = stream.read(buf).await?;
    if n < 2 {
        return Err(Socks5Error::Truncated("command").into());
    }

    match SocksCommand::try_from(buf[1]) {
        Ok(SocksCommand::Connect) => tcp.proxy(stream, &buf[..n]).await,
        Ok(SocksCommand::UdpAssociate) => handle_udp_associate(stream, udp_bind).await,
        Ok(SocksCommand::Bind) => {
            warn!("SOCKS5 BIND not supported");
            build_reply(&mut stream, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED, None).await
        }
        Err(e) => {
            warn!("{}", e);
            build_reply(&mut stream, SOCKS5_REPLY_COMMAND_NOT_SUPPORTED, None).await
        }
    }
}

/// Serve one local SOCKS5 client connection
pub async fn handle_socks5<S>(
    mut stream: S,
    tcp: &TcpProxy,
    udp_bind: SocketAddr,
    buffer_size: usize,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut buf = vec![0u8; buffer_size];
    check_version(&mut stream, &mut buf).await?;
    debug!("SOCKS5 greeting accepted");
    dispatch(stream, &mut buf, tcp, udp_bind).await
}
