//! UDP relay between one local socket and many remote streams
//!
//! A single task drains the shared socket. The first datagram from a client
//! opens a logical stream for its destination and registers a NAT entry;
//! a dedicated task then carries replies back to that client until the stream
//! fails or idles out, at which point the entry is removed.

use super::nat::{NatLease, NatTable};
use super::packet::parse_udp_envelope;
use crate::context::ProxyContext;
use crate::error::Result;
use crate::pool::TrafficStats;
use crate::protocol::{self, Network, PlainCodec, XorCipher};
use crate::socks::types::TargetAddr;
use crate::transport::StreamDyn;
use crate::tunnel::Tunnel;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, ReadHalf};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace, warn};

/// Largest payload a single UDP datagram can carry
const MAX_DATAGRAM_LEN: usize = 65535;

/// Shared-socket UDP relay
pub struct UdpRelay {
    socket: Arc<UdpSocket>,
    tunnel: Arc<Tunnel>,
    nat: Arc<NatTable>,
    cipher: Option<XorCipher>,
    idle_timeout: Duration,
    stats: Arc<TrafficStats>,
}

impl UdpRelay {
    /// Create a relay over an already bound socket
    pub fn new(socket: UdpSocket, tunnel: Arc<Tunnel>, ctx: &ProxyContext) -> Self {
        UdpRelay {
            socket: Arc::new(socket),
            tunnel,
            nat: Arc::new(NatTable::new()),
            cipher: ctx.cipher,
            idle_timeout: ctx.timeout(),
            stats: ctx.stats.clone(),
        }
    }

    /// Address the relay socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// The relay's NAT table
    pub fn nat(&self) -> &Arc<NatTable> {
        &self.nat
    }

    /// Spawn the inbound task
    pub fn start(self: Arc<Self>, shutdown: broadcast::Receiver<bool>) -> JoinHandle<()> {
        if let Ok(addr) = self.local_addr() {
            info!("UDP relay listening on {}", addr);
        }
        tokio::spawn(self.to_remote(shutdown))
    }

    async fn to_remote(self: Arc<Self>, mut shutdown: broadcast::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        loop {
            let received = tokio::select! {
                _ = shutdown.recv() => break,
                r = timeout(self.idle_timeout, self.socket.recv_from(&mut buf)) => r,
            };
            let (n, client) = match received {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => {
                    debug!("UDP receive error: {}", e);
                    continue;
                }
                Err(_) => continue,
            };
            if n == 0 {
                continue;
            }
            if let Err(e) = self.handle_datagram(&mut buf[..n], client).await {
                debug!("Dropping datagram from {}: {}", client, e);
            }
        }
        debug!("UDP relay inbound task stopped");
    }

    async fn handle_datagram(self: &Arc<Self>, datagram: &mut [u8], client: SocketAddr) -> Result<()> {
        let envelope = parse_udp_envelope(datagram)?;
        let (header, data) = datagram.split_at_mut(envelope.header_len);

        let writer = match self.nat.writer(&client) {
            Some(writer) => writer,
            None => {
                let target = match envelope.target {
                    TargetAddr::Ip(addr) => addr,
                    domain @ TargetAddr::Domain(..) => domain.resolve().await?,
                };
                let stream = self
                    .tunnel
                    .open_stream(Network::Udp, &target.ip().to_string(), &target.port().to_string())
                    .await?;
                let (reader, writer) = tokio::io::split(stream);
                let writer = Arc::new(Mutex::new(writer));
                let header = Bytes::copy_from_slice(header);
                let lease = self.nat.register(client, writer.clone(), header.clone());
                debug!("New UDP session {} -> {}", client, target);
                tokio::spawn(self.clone().to_local(reader, header, lease));
                writer
            }
        };

        if let Some(cipher) = &self.cipher {
            cipher.apply(data);
        }
        let frame = protocol::encode(data);
        writer.lock().await.write_all(&frame).await?;
        self.stats.record_written(data.len());
        trace!("Forwarded {} bytes from {}", data.len(), client);
        Ok(())
    }

    async fn to_local(
        self: Arc<Self>,
        reader: ReadHalf<Box<dyn StreamDyn>>,
        header: Bytes,
        lease: NatLease,
    ) {
        let client = lease.client();
        let mut frames = FramedRead::new(reader, PlainCodec);
        loop {
            let mut payload = match timeout(self.idle_timeout, frames.next()).await {
                Ok(Some(Ok(frame))) if !frame.is_empty() => frame,
                Ok(Some(Err(e))) => {
                    debug!("UDP session {} read failed: {}", client, e);
                    break;
                }
                Ok(_) => break,
                Err(_) => {
                    debug!("UDP session {} idle, closing", client);
                    break;
                }
            };
            if let Some(cipher) = &self.cipher {
                cipher.apply(&mut payload);
            }
            let mut datagram = BytesMut::with_capacity(header.len() + payload.len());
            datagram.extend_from_slice(&header);
            datagram.extend_from_slice(&payload);
            match self.socket.send_to(&datagram, client).await {
                Ok(_) => self.stats.record_read(payload.len()),
                Err(e) => warn!("Failed to send datagram to {}: {}", client, e),
            }
        }
        drop(lease);
        debug!("UDP session {} ended", client);
    }
}

impl std::fmt::Debug for UdpRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpRelay")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("nat", &self.nat)
            .finish()
    }
}
