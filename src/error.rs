//! Error types for Veilsocks
//!
//! Every failure is local to one client connection, one datagram or one relay
//! direction. The variants mirror how the caller reacts: parse failures drop
//! the connection, transport failures invalidate the shared session and are
//! answered with a refusal, codec failures end a single relay direction.

use std::io;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, VeilError>;

/// Main error type for Veilsocks operations
#[derive(Error, Debug)]
pub enum VeilError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed SOCKS5 command or UDP envelope
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),

    /// Dialing, opening a logical stream, or the handshake failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Frame, padding or compression failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Handshake record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl VeilError {
    /// Whether this error came from parsing client input
    pub fn is_parse(&self) -> bool {
        matches!(self, VeilError::Socks5(_))
    }

    /// Whether this error came from the transport side
    pub fn is_transport(&self) -> bool {
        matches!(self, VeilError::Transport(_) | VeilError::Timeout(_))
    }
}

impl From<snap::Error> for VeilError {
    fn from(err: snap::Error) -> Self {
        VeilError::Codec(err.to_string())
    }
}

/// SOCKS5 specific parse errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Fragmented UDP datagrams are not relayed
    #[error("Fragmented datagram: {0}")]
    Fragmented(u8),

    /// Buffer ended before the field it should contain
    #[error("Truncated {0}")]
    Truncated(&'static str),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),
}
