//! Main client structure
//!
//! Binds the local endpoints and runs the SOCKS5 accept loop.

use crate::config::Config;
use crate::context::ProxyContext;
use crate::socks::{handle_socks5, TcpProxy, UdpRelay};
use crate::transport::{create_transport, AddrMaybeCached, SessionFactory, TransportSessionFactory};
use crate::tunnel::Tunnel;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Local SOCKS5 front-end bound to its listen address
pub struct Client {
    ctx: ProxyContext,
    listener: TcpListener,
    proxy: Arc<TcpProxy>,
    udp: Arc<UdpRelay>,
}

impl Client {
    /// Validate `config`, build the transport and bind the local endpoints
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ctx = config.init();

        let transport = create_transport(&ctx.config)?;
        let addr = AddrMaybeCached::new(&ctx.config.server_addr);
        let factory = Arc::new(TransportSessionFactory::new(transport, addr));

        Client::with_factory(ctx, factory).await
    }

    /// Bind the local endpoints using a custom session factory
    pub async fn with_factory(ctx: ProxyContext, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        let tunnel = Arc::new(Tunnel::from_context(&ctx, factory));

        let listener = TcpListener::bind(&ctx.config.local_addr)
            .await
            .with_context(|| format!("Failed to listen on {}", ctx.config.local_addr))?;
        let local = listener.local_addr()?;
        let socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("Failed to bind UDP relay on {}", local))?;

        let proxy = Arc::new(TcpProxy::new(tunnel.clone(), &ctx));
        let udp = Arc::new(UdpRelay::new(socket, tunnel, &ctx));

        Ok(Client {
            ctx,
            listener,
            proxy,
            udp,
        })
    }

    /// Address of the SOCKS5 listener
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Address of the UDP relay socket
    pub fn udp_addr(&self) -> Result<SocketAddr> {
        Ok(self.udp.local_addr()?)
    }

    /// Run the accept loop until shutdown
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let local = self.local_addr()?;
        let udp_bind = self.udp_addr()?;
        info!("Veilsocks listening on {}", local);
        info!(
            "Remote server: {} via {}",
            self.ctx.config.server_addr, self.ctx.config.protocol
        );

        let relay = self.udp.clone().start(shutdown_rx.resubscribe());
        let buffer_size = self.ctx.config.buffer_size;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let _ = stream.set_nodelay(true);
                            let proxy = self.proxy.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_socks5(stream, &proxy, udp_bind, buffer_size).await {
                                    debug!("Connection from {} ended: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping client");
                    break;
                }
            }
        }

        relay.abort();
        let totals = self.ctx.stats.snapshot();
        info!(
            "Client stopped: {} bytes sent, {} bytes received, {} streams",
            totals.bytes_written, totals.bytes_read, totals.streams_opened
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let result = Client::new(Config::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_new_binds_tcp_and_udp_on_same_port() {
        let config = Config {
            local_addr: "127.0.0.1:0".to_string(),
            server_addr: "127.0.0.1:9".to_string(),
            protocol: crate::config::TransportType::Tcp,
            ..Default::default()
        };

        let client = Client::new(config).await.unwrap();
        let tcp = client.local_addr().unwrap();
        let udp = client.udp_addr().unwrap();
        assert_eq!(tcp, udp);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let config = Config {
            local_addr: "127.0.0.1:0".to_string(),
            server_addr: "127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = Client::new(config).await.unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(client.run(rx));
        tx.send(true).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
