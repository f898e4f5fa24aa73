//! TLS transport implementation
//!
//! Wraps a TCP connection in TLS using rustls with the system trust store.
//! Used underneath the `wss` WebSocket upgrade.

use super::{AddrMaybeCached, TcpTransport, Transport};
use crate::config::Config;
use crate::error::{Result, VeilError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

/// TLS stream type alias
pub type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// TLS transport for encrypted connections using rustls
#[derive(Clone)]
pub struct TlsTransport {
    /// TLS connector
    connector: TlsConnector,
    /// Underlying TCP dialer
    tcp: TcpTransport,
    /// Whether certificate verification is skipped
    insecure: bool,
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("tcp", &self.tcp)
            .field("insecure", &self.insecure)
            .finish()
    }
}

impl TlsTransport {
    /// Create a TLS transport over the given TCP dialer
    pub fn with_tcp(tcp: TcpTransport, insecure: bool) -> Self {
        let tls_config = if insecure {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        } else {
            let mut root_store = RootCertStore::empty();
            let native_certs = rustls_native_certs::load_native_certs();
            for err in &native_certs.errors {
                tracing::warn!("Failed to load a native certificate: {}", err);
            }
            for cert in native_certs.certs {
                root_store.add(cert).ok();
            }
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        TlsTransport {
            connector: TlsConnector::from(Arc::new(tls_config)),
            tcp,
            insecure,
        }
    }

    /// Perform the TLS handshake on an established TCP stream
    pub async fn handshake(&self, hostname: &str, stream: TcpStream) -> Result<TlsStream> {
        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|e| VeilError::Transport(format!("invalid hostname {}: {}", hostname, e)))?;

        self.connector
            .connect(server_name, stream)
            .await
            .map_err(|e| VeilError::Transport(format!("TLS handshake failed with {}: {}", hostname, e)))
    }
}

/// Certificate verifier that accepts all certificates
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[async_trait]
impl Transport for TlsTransport {
    type Stream = TlsStream;

    fn new(config: &Config) -> Result<Self> {
        let tcp = TcpTransport::with_defaults()
            .with_connect_timeout(Duration::from_secs(config.timeout_secs));
        Ok(TlsTransport::with_tcp(tcp, config.insecure))
    }

    async fn connect(&self, addr: &AddrMaybeCached) -> Result<Self::Stream> {
        let tcp_stream = self.tcp.connect(addr).await?;
        let tls_stream = self.handshake(addr.host(), tcp_stream).await?;

        tracing::debug!("TLS connection established to {}", addr);

        Ok(tls_stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_transport_insecure() {
        let transport = TlsTransport::with_tcp(TcpTransport::with_defaults(), true);
        assert!(transport.insecure);
    }

    #[test]
    fn test_tls_transport_from_config() {
        let config = Config {
            insecure: true,
            ..Default::default()
        };
        let transport = TlsTransport::new(&config).unwrap();
        assert!(format!("{:?}", transport).contains("insecure: true"));
    }

    #[tokio::test]
    async fn test_tls_handshake_rejects_bad_hostname() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();

        let transport = TlsTransport::with_tcp(TcpTransport::with_defaults(), true);
        let result = transport.handshake("not a hostname!", stream).await;
        assert!(matches!(result, Err(VeilError::Transport(_))));
    }
}
