//! Test utilities and mocks for Veilsocks
//!
//! The tunnel is replaced by in-memory sessions whose logical streams are
//! duplex pipes; the far end of every opened stream is handed to the test,
//! which plays the remote peer.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use veilsocks::error::{Result, VeilError};
use veilsocks::protocol::{ProxyRequest, XorCipher};
use veilsocks::transport::{MuxSession, SessionFactory, StreamDyn};

/// Session whose streams are duplex pipes
pub struct PipeSession {
    peers: mpsc::UnboundedSender<DuplexStream>,
    closed: AtomicBool,
    fail_open: AtomicBool,
}

impl PipeSession {
    /// Make every following open fail
    pub fn fail_opens(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    /// Report the session as closed
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MuxSession for PipeSession {
    async fn open(&self) -> Result<Box<dyn StreamDyn>> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(VeilError::Transport("open refused".into()));
        }
        let (local, remote) = duplex(256 * 1024);
        self.peers
            .send(remote)
            .map_err(|_| VeilError::Transport("peer gone".into()))?;
        Ok(Box::new(local))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Factory counting how many sessions were established
pub struct PipeFactory {
    peers: mpsc::UnboundedSender<DuplexStream>,
    established: AtomicUsize,
    fail_establish: AtomicBool,
    sessions: Mutex<Vec<Arc<PipeSession>>>,
}

impl PipeFactory {
    /// Create a factory and the receiver of remote stream ends
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = Arc::new(PipeFactory {
            peers: tx,
            established: AtomicUsize::new(0),
            fail_establish: AtomicBool::new(false),
            sessions: Mutex::new(Vec::new()),
        });
        (factory, rx)
    }

    /// Number of sessions established so far
    pub fn established(&self) -> usize {
        self.established.load(Ordering::SeqCst)
    }

    /// Make establishment fail (or succeed again)
    pub fn set_fail_establish(&self, fail: bool) {
        self.fail_establish.store(fail, Ordering::SeqCst);
    }

    /// Most recently established session
    pub fn last_session(&self) -> Option<Arc<PipeSession>> {
        self.sessions.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SessionFactory for PipeFactory {
    async fn establish(&self) -> Result<Arc<dyn MuxSession>> {
        if self.fail_establish.load(Ordering::SeqCst) {
            return Err(VeilError::Transport("dial refused".into()));
        }
        self.established.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(PipeSession {
            peers: self.peers.clone(),
            closed: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
        });
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }
}

/// Wait for the next stream the proxy opens
pub async fn next_peer(rx: &mut mpsc::UnboundedReceiver<DuplexStream>) -> DuplexStream {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a stream")
        .expect("factory dropped")
}

/// Read one plain frame payload from `peer`
pub async fn read_plain_frame(peer: &mut DuplexStream) -> Vec<u8> {
    let mut len = [0u8; 4];
    peer.read_exact(&mut len).await.unwrap();
    let mut payload = vec![0u8; u32::from_le_bytes(len) as usize];
    peer.read_exact(&mut payload).await.unwrap();
    payload
}

/// Read the handshake the proxy writes first on every stream
pub async fn read_handshake(peer: &mut DuplexStream, cipher: Option<&XorCipher>) -> ProxyRequest {
    let payload = read_plain_frame(peer).await;
    ProxyRequest::decode(&payload, cipher).unwrap()
}

/// SOCKS5 CONNECT command for an IPv4 destination
pub fn connect_ipv4(ip: Ipv4Addr, port: u16) -> Vec<u8> {
    let mut cmd = vec![0x05, 0x01, 0x00, 0x01];
    cmd.extend_from_slice(&ip.octets());
    cmd.extend_from_slice(&port.to_be_bytes());
    cmd
}

/// SOCKS5 CONNECT command for a domain destination
pub fn connect_domain(domain: &str, port: u16) -> Vec<u8> {
    let mut cmd = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    cmd.extend_from_slice(domain.as_bytes());
    cmd.extend_from_slice(&port.to_be_bytes());
    cmd
}

/// Spawn a TCP echo server on an available loopback port
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = stream.into_split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}
