//! Transport selector
//!
//! Names the byte-stream transport used to reach the remote endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport type enumeration
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportType {
    /// Plain TCP byte stream
    #[serde(rename = "tcp")]
    Tcp,
    /// WebSocket upgrade over plain TCP
    #[default]
    #[serde(rename = "ws")]
    Ws,
    /// WebSocket upgrade over TLS
    #[serde(rename = "wss")]
    Wss,
    /// Reliable-UDP transport; accepted by the parser, rejected by validation
    #[serde(rename = "kcp")]
    Kcp,
}

impl TransportType {
    /// Whether the transport performs a WebSocket upgrade before use
    pub fn is_websocket(self) -> bool {
        matches!(self, TransportType::Ws | TransportType::Wss)
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportType::Tcp => "tcp",
            TransportType::Ws => "ws",
            TransportType::Wss => "wss",
            TransportType::Kcp => "kcp",
        };
        f.write_str(name)
    }
}

impl FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportType::Tcp),
            "ws" => Ok(TransportType::Ws),
            "wss" => Ok(TransportType::Wss),
            "kcp" => Ok(TransportType::Kcp),
            other => Err(format!("unknown protocol: {}", other)),
        }
    }
}
