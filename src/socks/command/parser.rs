//! SOCKS5 command parser
//!
//! Turns a buffered command frame into a routable destination.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Parse the destination out of a CONNECT command frame
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The port is always the final two bytes of the frame. A domain name spans
/// from byte 5 up to the port.
pub fn parse_connect_target(buf: &[u8]) -> Result<TargetAddr, Socks5Error> {
    if buf.len() < 4 {
        return Err(Socks5Error::Truncated("command header"));
    }
    let len = buf.len();

    let target = match buf[3] {
        SOCKS5_ADDR_TYPE_IPV4 => {
            if len < 10 {
                return Err(Socks5Error::Truncated("IPv4 address"));
            }
            let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);
            TargetAddr::ipv4(ip, port_at_end(buf))
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            if len < 8 {
                return Err(Socks5Error::Truncated("domain name"));
            }
            let name = &buf[5..len - 2];
            let domain = std::str::from_utf8(name)
                .map_err(|_| Socks5Error::InvalidDomain(String::from_utf8_lossy(name).into_owned()))?;
            TargetAddr::Domain(domain.to_string(), port_at_end(buf))
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            if len < 22 {
                return Err(Socks5Error::Truncated("IPv6 address"));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[4..20]);
            TargetAddr::ipv6(Ipv6Addr::from(octets), port_at_end(buf))
        }
        other => return Err(Socks5Error::AddressTypeNotSupported(other)),
    };

    Ok(target)
}

fn port_at_end(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[buf.len() - 2], buf[buf.len() - 1]])
}
