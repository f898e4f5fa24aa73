//! Stream multiplexing over one physical connection
//!
//! [`YamuxSession`] hands the `yamux::Connection` to a dedicated driver task.
//! Callers ask that task for new outbound streams through a channel; the
//! session reports itself closed once the driver exits.

use super::{AddrMaybeCached, StreamDyn, TransportDyn};
use crate::error::{Result, VeilError};
use async_trait::async_trait;
use futures::future::poll_fn;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::{FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tracing::{debug, info, warn};

/// A live multiplexed session
#[async_trait]
pub trait MuxSession: Send + Sync {
    /// Open a new logical stream
    async fn open(&self) -> Result<Box<dyn StreamDyn>>;

    /// Whether the underlying connection has gone away
    fn is_closed(&self) -> bool;
}

/// Establishes a new multiplexed session
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Dial the remote endpoint and wrap the connection in a session
    async fn establish(&self) -> Result<Arc<dyn MuxSession>>;
}

type OpenRequest = oneshot::Sender<yamux::Stream>;

/// Client-mode yamux session
pub struct YamuxSession {
    requests: mpsc::Sender<OpenRequest>,
    closed: Arc<AtomicBool>,
}

impl YamuxSession {
    /// Start a client session over `stream`
    ///
    /// Must be called from within a tokio runtime.
    pub fn client<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection = yamux::Connection::new(
            TokioAsyncReadCompatExt::compat(stream),
            yamux::Config::default(),
            yamux::Mode::Client,
        );
        let (requests, rx) = mpsc::channel(32);
        let closed = Arc::new(AtomicBool::new(false));
        tokio::spawn(drive(connection, rx, closed.clone()));
        YamuxSession { requests, closed }
    }
}

#[async_trait]
impl MuxSession for YamuxSession {
    async fn open(&self) -> Result<Box<dyn StreamDyn>> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(tx)
            .await
            .map_err(|_| VeilError::Transport("multiplexed session is closed".to_string()))?;
        let stream = rx
            .await
            .map_err(|_| VeilError::Transport("failed to open logical stream".to_string()))?;
        Ok(Box::new(FuturesAsyncReadCompatExt::compat(stream)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.requests.is_closed()
    }
}

/// Drive the connection until it fails or every session handle is dropped
async fn drive<T>(
    mut connection: yamux::Connection<T>,
    mut requests: mpsc::Receiver<OpenRequest>,
    closed: Arc<AtomicBool>,
) where
    T: futures::AsyncRead + futures::AsyncWrite + Unpin + Send,
{
    let mut waiting: VecDeque<OpenRequest> = VecDeque::new();
    let mut accepting = true;

    let result = poll_fn(|cx| {
        while accepting {
            match requests.poll_recv(cx) {
                Poll::Ready(Some(tx)) => waiting.push_back(tx),
                Poll::Ready(None) => accepting = false,
                Poll::Pending => break,
            }
        }

        if !accepting && waiting.is_empty() {
            return connection.poll_close(cx);
        }

        while !waiting.is_empty() {
            match connection.poll_new_outbound(cx) {
                Poll::Ready(Ok(stream)) => {
                    if let Some(tx) = waiting.pop_front() {
                        let _ = tx.send(stream);
                    }
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => break,
            }
        }

        loop {
            match connection.poll_next_inbound(cx) {
                Poll::Ready(Some(Ok(_))) => {
                    debug!("Dropping peer-initiated stream");
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(e)),
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    })
    .await;

    closed.store(true, Ordering::Release);
    match result {
        Ok(()) => info!("Multiplexed session closed"),
        Err(e) => warn!("Multiplexed session failed: {}", e),
    }
}

/// Session factory that dials through a [`TransportDyn`]
#[derive(Debug)]
pub struct TransportSessionFactory {
    transport: Box<dyn TransportDyn>,
    addr: AddrMaybeCached,
}

impl TransportSessionFactory {
    /// Create a factory dialing `addr` with `transport`
    pub fn new(transport: Box<dyn TransportDyn>, addr: AddrMaybeCached) -> Self {
        TransportSessionFactory { transport, addr }
    }
}

#[async_trait]
impl SessionFactory for TransportSessionFactory {
    async fn establish(&self) -> Result<Arc<dyn MuxSession>> {
        let stream = self.transport.connect_dyn(&self.addr).await?;
        info!("Connected to {}, starting multiplexed session", self.addr);
        Ok(Arc::new(YamuxSession::client(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    /// Minimal server side: accepts streams and echoes their bytes
    fn spawn_echo_server<S>(socket: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection = yamux::Connection::new(
            TokioAsyncReadCompatExt::compat(socket),
            yamux::Config::default(),
            yamux::Mode::Server,
        );
        tokio::spawn(async move {
            let mut inbound = futures::stream::poll_fn({
                let mut connection = connection;
                move |cx| connection.poll_next_inbound(cx)
            });
            while let Some(Ok(stream)) = inbound.next().await {
                tokio::spawn(async move {
                    let (mut r, mut w) = tokio::io::split(FuturesAsyncReadCompatExt::compat(stream));
                    let _ = tokio::io::copy(&mut r, &mut w).await;
                });
            }
        });
    }

    #[tokio::test]
    async fn test_yamux_session_open_and_echo() {
        let (client, server) = duplex(64 * 1024);
        spawn_echo_server(server);

        let session = YamuxSession::client(client);
        assert!(!session.is_closed());

        for _ in 0..2 {
            let mut stream = session.open().await.unwrap();
            stream.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf, b"ping");
        }
    }

    #[tokio::test]
    async fn test_yamux_session_closed_when_peer_goes_away() {
        let (client, server) = duplex(1024);
        let session = YamuxSession::client(client);
        drop(server);

        let mut closed = false;
        for _ in 0..50 {
            if session.is_closed() {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(closed);
        assert!(session.open().await.is_err());
    }
}
