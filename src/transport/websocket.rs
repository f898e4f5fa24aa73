//! WebSocket transport implementation
//!
//! Dials TCP (or TLS for `wss`), performs a WebSocket upgrade on the configured
//! path, and then hands back the underlying stream. No WebSocket framing is
//! applied after the upgrade; the remote peer reads the raw connection too.

use super::{AddrMaybeCached, StreamDyn, TcpTransport, Transport};
use crate::config::{Config, TransportType};
use crate::error::{Result, VeilError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;

#[cfg(feature = "rustls-tls")]
use super::TlsTransport;

/// Build the upgrade request for `host` and `path`
fn upgrade_request(host: &str, path: &str) -> Result<Request<()>> {
    Request::builder()
        .uri(format!("ws://{}{}", host, path))
        .header("Host", host)
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .body(())
        .map_err(|e| VeilError::Transport(format!("invalid websocket request: {}", e)))
}

/// Perform the client side of a WebSocket upgrade on `stream`
///
/// The response must be `101` with a matching `Sec-WebSocket-Accept`. The
/// handshake only borrows `stream`, which stays usable as a raw byte stream.
/// The remote peer sends nothing until the client's first frame, so no bytes
/// are left in the handshake buffer.
pub async fn websocket_upgrade<S>(stream: &mut S, host: &str, path: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let request = upgrade_request(host, path)?;
    let (_ws, response) = tokio_tungstenite::client_async(request, stream)
        .await
        .map_err(|e| VeilError::Transport(format!("websocket upgrade to {}{} failed: {}", host, path, e)))?;

    tracing::trace!(
        "WebSocket upgrade to {}{} accepted with status {}",
        host,
        path,
        response.status()
    );
    Ok(())
}

#[derive(Debug, Clone)]
enum Dialer {
    Plain(TcpTransport),
    #[cfg(feature = "rustls-tls")]
    Tls(TlsTransport),
}

/// WebSocket transport for `ws` and `wss`
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    dialer: Dialer,
    path: String,
}

#[async_trait]
impl Transport for WebSocketTransport {
    type Stream = Box<dyn StreamDyn>;

    fn new(config: &Config) -> Result<Self> {
        let tcp = TcpTransport::with_defaults()
            .with_connect_timeout(Duration::from_secs(config.timeout_secs));
        let dialer = match config.protocol {
            #[cfg(feature = "rustls-tls")]
            TransportType::Wss => Dialer::Tls(TlsTransport::with_tcp(tcp, config.insecure)),
            #[cfg(not(feature = "rustls-tls"))]
            TransportType::Wss => {
                return Err(VeilError::Config(
                    "wss requires the rustls-tls feature".to_string(),
                ))
            }
            _ => Dialer::Plain(tcp),
        };
        Ok(WebSocketTransport {
            dialer,
            path: config.ws_path.clone(),
        })
    }

    async fn connect(&self, addr: &AddrMaybeCached) -> Result<Self::Stream> {
        let mut stream: Box<dyn StreamDyn> = match &self.dialer {
            Dialer::Plain(tcp) => Box::new(tcp.connect(addr).await?),
            #[cfg(feature = "rustls-tls")]
            Dialer::Tls(tls) => Box::new(tls.connect(addr).await?),
        };

        websocket_upgrade(&mut stream, addr.addr(), &self.path).await?;
        tracing::debug!("WebSocket connection established to {}{}", addr, self.path);

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

    async fn read_request_head(stream: &mut DuplexStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    fn request_key(head: &str) -> String {
        head.lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("sec-websocket-key")
                    .then(|| value.trim().to_string())
            })
            .unwrap()
    }

    fn switching_protocols(accept: &str) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            accept
        )
    }

    #[tokio::test]
    async fn test_upgrade_accepted_then_raw_stream() {
        let (mut client, mut server) = duplex(4096);

        let server_task = tokio::spawn(async move {
            let head = read_request_head(&mut server).await;
            let accept = derive_accept_key(request_key(&head).as_bytes());
            server
                .write_all(switching_protocols(&accept).as_bytes())
                .await
                .unwrap();

            let mut buf = [0u8; 4];
            server.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            server.write_all(b"pong").await.unwrap();
            head
        });

        websocket_upgrade(&mut client, "example.com:80", "/opensocks")
            .await
            .unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        let head = server_task.await.unwrap();
        assert!(head.starts_with("GET /opensocks HTTP/1.1\r\n"));
        assert!(head.to_ascii_lowercase().contains("upgrade: websocket\r\n"));
    }

    #[tokio::test]
    async fn test_upgrade_rejects_wrong_accept_key() {
        let (mut client, mut server) = duplex(4096);

        tokio::spawn(async move {
            read_request_head(&mut server).await;
            server
                .write_all(switching_protocols("definitely-wrong").as_bytes())
                .await
                .unwrap();
            let mut sink = Vec::new();
            let _ = server.read_to_end(&mut sink).await;
        });

        let err = websocket_upgrade(&mut client, "example.com:80", "/opensocks")
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_upgrade_rejected_status() {
        let (mut client, mut server) = duplex(4096);

        tokio::spawn(async move {
            read_request_head(&mut server).await;
            server
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
            let mut sink = Vec::new();
            let _ = server.read_to_end(&mut sink).await;
        });

        let err = websocket_upgrade(&mut client, "h", "/opensocks")
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_upgrade_peer_closes() {
        let (mut client, mut server) = duplex(4096);

        tokio::spawn(async move {
            read_request_head(&mut server).await;
            drop(server);
        });

        assert!(websocket_upgrade(&mut client, "h", "/").await.is_err());
    }

    #[test]
    fn test_ws_transport_uses_configured_path() {
        let config = Config {
            protocol: TransportType::Ws,
            ws_path: "/tunnel".to_string(),
            ..Default::default()
        };
        let transport = WebSocketTransport::new(&config).unwrap();
        assert_eq!(transport.path, "/tunnel");
        assert!(matches!(transport.dialer, Dialer::Plain(_)));
    }
}
