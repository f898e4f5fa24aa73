//! Lazily established multiplexed session
//!
//! One [`Tunnel`] owns at most one live session. The first caller that needs a
//! stream establishes it under the lock; any open or handshake failure clears
//! it so the next caller dials again.

use crate::context::ProxyContext;
use crate::error::{Result, VeilError};
use crate::pool::TrafficStats;
use crate::protocol::{handshake, Network, XorCipher};
use crate::transport::{MuxSession, SessionFactory, StreamDyn};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Holder of the shared multiplexed session
pub struct Tunnel {
    factory: Arc<dyn SessionFactory>,
    session: Mutex<Option<Arc<dyn MuxSession>>>,
    key: String,
    cipher: Option<XorCipher>,
    stats: Arc<TrafficStats>,
}

fn same_session(a: &Arc<dyn MuxSession>, b: &Arc<dyn MuxSession>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl Tunnel {
    /// Create a tunnel with no session yet
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        key: impl Into<String>,
        cipher: Option<XorCipher>,
        stats: Arc<TrafficStats>,
    ) -> Self {
        Tunnel {
            factory,
            session: Mutex::new(None),
            key: key.into(),
            cipher,
            stats,
        }
    }

    /// Create a tunnel using the key, pad and counters of `ctx`
    pub fn from_context(ctx: &ProxyContext, factory: Arc<dyn SessionFactory>) -> Self {
        Tunnel::new(factory, ctx.config.key.clone(), ctx.cipher, ctx.stats.clone())
    }

    /// Get the live session, establishing one if absent or closed
    pub async fn session(&self) -> Result<Arc<dyn MuxSession>> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if !session.is_closed() {
                return Ok(session.clone());
            }
            debug!("Multiplexed session closed, re-establishing");
            *guard = None;
        }

        let session = self.factory.establish().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    /// Clear the session if it is still `stale`
    ///
    /// A session that already replaced `stale` is left alone.
    pub async fn invalidate(&self, stale: &Arc<dyn MuxSession>) {
        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(|current| same_session(current, stale)) {
            *guard = None;
        }
    }

    /// Whether a session is currently held
    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Open a logical stream and announce the destination on it
    ///
    /// Every failure is reported as a transport error. Open and handshake
    /// failures also drop the session.
    pub async fn open_stream(
        &self,
        network: Network,
        host: &str,
        port: &str,
    ) -> Result<Box<dyn StreamDyn>> {
        let session = self.session().await.map_err(|e| {
            warn!("Failed to establish multiplexed session: {}", e);
            into_transport(e)
        })?;

        let mut stream = match session.open().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to open logical stream: {}", e);
                self.invalidate(&session).await;
                return Err(into_transport(e));
            }
        };

        if let Err(e) = handshake(
            &mut stream,
            network,
            host,
            port,
            &self.key,
            self.cipher.as_ref(),
        )
        .await
        {
            warn!("Handshake for {}:{} failed: {}", host, port, e);
            self.invalidate(&session).await;
            return Err(into_transport(e));
        }

        self.stats.record_stream();
        debug!("Opened {} stream to {}:{}", network, host, port);
        Ok(stream)
    }
}

fn into_transport(e: VeilError) -> VeilError {
    match e {
        e @ (VeilError::Transport(_) | VeilError::Timeout(_)) => e,
        other => VeilError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct NullSession {
        fail_open: bool,
        closed: AtomicBool,
    }

    #[async_trait]
    impl MuxSession for NullSession {
        async fn open(&self) -> Result<Box<dyn StreamDyn>> {
            if self.fail_open {
                return Err(VeilError::Transport("open refused".to_string()));
            }
            let (a, _b) = tokio::io::duplex(1024);
            Ok(Box::new(a))
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct CountingFactory {
        established: AtomicUsize,
        fail_open: bool,
        last: std::sync::Mutex<Option<Arc<NullSession>>>,
    }

    #[async_trait]
    impl SessionFactory for CountingFactory {
        async fn establish(&self) -> Result<Arc<dyn MuxSession>> {
            self.established.fetch_add(1, Ordering::SeqCst);
            let session = Arc::new(NullSession {
                fail_open: self.fail_open,
                closed: AtomicBool::new(false),
            });
            *self.last.lock().unwrap() = Some(session.clone());
            Ok(session)
        }
    }

    fn tunnel(fail_open: bool) -> (Tunnel, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory {
            established: AtomicUsize::new(0),
            fail_open,
            last: std::sync::Mutex::new(None),
        });
        let tunnel = Tunnel::new(factory.clone(), "k", None, Arc::new(TrafficStats::new()));
        (tunnel, factory)
    }

    #[tokio::test]
    async fn test_session_is_reused() {
        let (tunnel, factory) = tunnel(false);
        let a = tunnel.session().await.unwrap();
        let b = tunnel.session().await.unwrap();
        assert!(same_session(&a, &b));
        assert_eq!(factory.established.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_only_clears_matching_session() {
        let (tunnel, factory) = tunnel(false);
        let first = tunnel.session().await.unwrap();
        tunnel.invalidate(&first).await;
        assert!(!tunnel.has_session().await);

        let second = tunnel.session().await.unwrap();
        tunnel.invalidate(&first).await;
        assert!(tunnel.has_session().await);
        assert!(same_session(&second, &tunnel.session().await.unwrap()));
        assert_eq!(factory.established.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_open_failure_drops_session() {
        let (tunnel, factory) = tunnel(true);
        let err = tunnel
            .open_stream(Network::Tcp, "example.com", "80")
            .await
            .err()
            .unwrap();
        assert!(err.is_transport());
        assert!(!tunnel.has_session().await);

        let _ = tunnel.open_stream(Network::Tcp, "example.com", "80").await;
        assert_eq!(factory.established.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handshake_failure_drops_session() {
        // The peer end of the duplex is dropped, so the handshake write fails.
        let (tunnel, _factory) = tunnel(false);
        let err = tunnel
            .open_stream(Network::Udp, "8.8.8.8", "53")
            .await
            .err()
            .unwrap();
        assert!(err.is_transport());
        assert!(!tunnel.has_session().await);
    }

    #[tokio::test]
    async fn test_closed_session_is_replaced() {
        let (tunnel, factory) = tunnel(false);
        tunnel.session().await.unwrap();

        let last = factory.last.lock().unwrap().clone().unwrap();
        last.closed.store(true, Ordering::SeqCst);

        tunnel.session().await.unwrap();
        assert_eq!(factory.established.load(Ordering::SeqCst), 2);
    }
}
