//! SOCKS5 request types

use super::consts::*;
use crate::error::{Result, Socks5Error, VeilError};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Command carried in the second byte of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksCommand {
    /// Relay a TCP stream to the destination
    Connect,
    /// Accept an inbound connection; always answered as unsupported
    Bind,
    /// Relay datagrams through the shared UDP socket
    UdpAssociate,
}

impl TryFrom<u8> for SocksCommand {
    type Error = Socks5Error;

    fn try_from(byte: u8) -> std::result::Result<Self, Self::Error> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Ok(SocksCommand::Connect),
            SOCKS5_CMD_TCP_BIND => Ok(SocksCommand::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Ok(SocksCommand::UdpAssociate),
            other => Err(Socks5Error::CommandNotSupported(other)),
        }
    }
}

/// Destination named by a request or UDP envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// IPv4 or IPv6 literal
    Ip(SocketAddr),
    /// Domain name, resolved only when dialled locally
    Domain(String, u16),
}

impl TargetAddr {
    pub(crate) fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    pub(crate) fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Host as announced in a handshake: IP literal or domain name
    pub fn host(&self) -> String {
        match self {
            TargetAddr::Ip(addr) => addr.ip().to_string(),
            TargetAddr::Domain(domain, _) => domain.clone(),
        }
    }

    /// Destination port
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Resolve to a socket address, looking up domains with the system resolver
    pub async fn resolve(&self) -> Result<SocketAddr> {
        let domain = match self {
            TargetAddr::Ip(addr) => return Ok(*addr),
            TargetAddr::Domain(domain, _) => domain,
        };
        let mut addrs = tokio::net::lookup_host((domain.as_str(), self.port()))
            .await
            .map_err(|e| VeilError::Transport(format!("failed to resolve {}: {}", domain, e)))?;
        addrs
            .next()
            .ok_or_else(|| VeilError::Transport(format!("no addresses found for {}", domain)))
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}
