//! UDP ASSOCIATE handler
//!
//! Answers the control connection with the relay socket's address and then
//! holds it open until the client goes away.

use crate::error::Result;
use crate::socks::command::build_reply;
use crate::socks::consts::*;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info};

/// Handle UDP ASSOCIATE command
///
/// The association lasts as long as the TCP control connection.
pub async fn handle_udp_associate<S>(mut control_stream: S, bind_addr: SocketAddr) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    build_reply(&mut control_stream, SOCKS5_REPLY_SUCCEEDED, Some(bind_addr)).await?;

    info!("UDP ASSOCIATE established, relay at {}", bind_addr);

    monitor_control_stream(control_stream).await;

    info!("UDP ASSOCIATE session ended");
    Ok(())
}

/// Read and discard until EOF or error
async fn monitor_control_stream<S>(mut stream: S)
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 64];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => {
                debug!("Control stream closed, terminating UDP association");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Control stream error: {}", e);
                break;
            }
        }
    }
}
