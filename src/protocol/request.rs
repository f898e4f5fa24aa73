//! Handshake record
//!
//! The first frame on every logical stream announces the client's true target
//! to the remote peer. It is a JSON object with fixed field names, optionally
//! XOR-obfuscated, carried in a plain frame.

use super::cipher::{random_nonce, XorCipher};
use super::frame;
use crate::error::{Result, VeilError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Network a logical stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Byte stream relay
    #[serde(rename = "tcp")]
    Tcp,
    /// Datagram relay
    #[serde(rename = "udp")]
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}

/// Destination request sent once per logical stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// Destination host, an IP literal or a domain name
    #[serde(rename = "Host")]
    pub host: String,
    /// Destination port in decimal
    #[serde(rename = "Port")]
    pub port: String,
    /// Shared pre-key, compared verbatim by the remote peer
    #[serde(rename = "Key")]
    pub key: String,
    /// Relay network
    #[serde(rename = "Network")]
    pub network: Network,
    /// Unix seconds in decimal
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    /// Per-handshake nonce
    #[serde(rename = "Random")]
    pub random: String,
}

impl ProxyRequest {
    /// Build a request stamped with the current time and a fresh nonce
    pub fn new(
        network: Network,
        host: impl Into<String>,
        port: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        ProxyRequest {
            host: host.into(),
            port: port.into(),
            key: key.into(),
            network,
            timestamp: now.to_string(),
            random: random_nonce(),
        }
    }

    /// Serialize, obfuscate when a cipher is given, and wrap in a plain frame
    pub fn to_frame(&self, cipher: Option<&XorCipher>) -> Result<Bytes> {
        let mut data = serde_json::to_vec(self)?;
        if let Some(cipher) = cipher {
            cipher.apply(&mut data);
        }
        Ok(frame::encode(&data))
    }

    /// Inverse of [`to_frame`](Self::to_frame) for an already unwrapped frame payload
    pub fn decode(payload: &[u8], cipher: Option<&XorCipher>) -> Result<Self> {
        let mut data = payload.to_vec();
        if let Some(cipher) = cipher {
            cipher.apply(&mut data);
        }
        Ok(serde_json::from_slice(&data)?)
    }

    /// Write the request as the first frame of `stream`
    pub async fn write_to<W>(&self, stream: &mut W, cipher: Option<&XorCipher>) -> Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let frame = self.to_frame(cipher)?;
        trace!("Writing {} byte handshake for {}:{}", frame.len(), self.host, self.port);
        stream
            .write_all(&frame)
            .await
            .map_err(|e| VeilError::Transport(format!("handshake write failed: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| VeilError::Transport(format!("handshake flush failed: {}", e)))?;
        Ok(())
    }
}

/// Build a request for the destination and write it to a fresh stream
///
/// Any failure is final for that stream.
pub async fn handshake<W>(
    stream: &mut W,
    network: Network,
    host: &str,
    port: &str,
    key: &str,
    cipher: Option<&XorCipher>,
) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    ProxyRequest::new(network, host, port, key)
        .write_to(stream, cipher)
        .await
}
