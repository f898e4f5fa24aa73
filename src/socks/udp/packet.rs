//! SOCKS5 UDP envelope parsing
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Destination and header extent of one client datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpEnvelope {
    /// Destination requested by the client
    pub target: TargetAddr,
    /// Number of header bytes before DATA
    pub header_len: usize,
}

/// Parse the envelope header of a client datagram
///
/// Fragmented datagrams (FRAG != 0) are rejected.
pub fn parse_udp_envelope(buf: &[u8]) -> Result<UdpEnvelope, Socks5Error> {
    if buf.len() < SOCKS5_UDP_FIXED_LEN {
        return Err(Socks5Error::Truncated("UDP envelope"));
    }
    if buf[2] != 0 {
        return Err(Socks5Error::Fragmented(buf[2]));
    }

    let (target, header_len) = match buf[3] {
        SOCKS5_ADDR_TYPE_IPV4 => {
            if buf.len() < 10 {
                return Err(Socks5Error::Truncated("IPv4 address"));
            }
            let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);
            let port = u16::from_be_bytes([buf[8], buf[9]]);
            (TargetAddr::ipv4(ip, port), 10)
        }
        SOCKS5_ADDR_TYPE_DOMAIN => {
            if buf.len() < 5 {
                return Err(Socks5Error::Truncated("domain length"));
            }
            let len = buf[4] as usize;
            if buf.len() < 7 + len {
                return Err(Socks5Error::Truncated("domain name"));
            }
            let name = &buf[5..5 + len];
            let domain = std::str::from_utf8(name)
                .map_err(|_| Socks5Error::InvalidDomain(String::from_utf8_lossy(name).into_owned()))?;
            let port = u16::from_be_bytes([buf[5 + len], buf[6 + len]]);
            (TargetAddr::Domain(domain.to_string(), port), 7 + len)
        }
        SOCKS5_ADDR_TYPE_IPV6 => {
            if buf.len() < 22 {
                return Err(Socks5Error::Truncated("IPv6 address"));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[4..20]);
            let port = u16::from_be_bytes([buf[20], buf[21]]);
            (TargetAddr::ipv6(Ipv6Addr::from(octets), port), 22)
        }
        other => return Err(Socks5Error::AddressTypeNotSupported(other)),
    };

    Ok(UdpEnvelope { target, header_len })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_envelope() {
        let datagram = [0, 0, 0, 1, 8, 8, 8, 8, 0, 53, b'p', b'i', b'n', b'g'];
        let envelope = parse_udp_envelope(&datagram).unwrap();
        assert_eq!(envelope.target, TargetAddr::ipv4(Ipv4Addr::new(8, 8, 8, 8), 53));
        assert_eq!(envelope.header_len, 10);
        assert_eq!(&datagram[envelope.header_len..], b"ping");
    }

    #[test]
    fn test_parse_domain_envelope() {
        let mut datagram = vec![0, 0, 0, SOCKS5_ADDR_TYPE_DOMAIN, 11];
        datagram.extend_from_slice(b"example.org");
        datagram.extend_from_slice(&8080u16.to_be_bytes());
        datagram.extend_from_slice(b"content");
        let envelope = parse_udp_envelope(&datagram).unwrap();
        assert_eq!(
            envelope.target,
            TargetAddr::Domain("example.org".to_string(), 8080)
        );
        assert_eq!(envelope.header_len, 7 + 11);
        assert_eq!(&datagram[envelope.header_len..], b"content");
    }

    #[test]
    fn test_parse_ipv6_envelope() {
        let mut datagram = vec![0, 0, 0, SOCKS5_ADDR_TYPE_IPV6];
        datagram.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        datagram.extend_from_slice(&5353u16.to_be_bytes());
        datagram.push(b'q');
        let envelope = parse_udp_envelope(&datagram).unwrap();
        assert_eq!(envelope.target, TargetAddr::ipv6(Ipv6Addr::LOCALHOST, 5353));
        assert_eq!(envelope.header_len, 22);
        assert_eq!(&datagram[22..], b"q");
    }

    #[test]
    fn test_fragmented_envelope_is_rejected() {
        let datagram = [0, 0, 1, 1, 8, 8, 8, 8, 0, 53, 0];
        assert_eq!(parse_udp_envelope(&datagram), Err(Socks5Error::Fragmented(1)));
    }

    #[test]
    fn test_unknown_atyp_and_truncation() {
        assert_eq!(
            parse_udp_envelope(&[0, 0, 0, 7, 1, 2]),
            Err(Socks5Error::AddressTypeNotSupported(7))
        );
        assert!(parse_udp_envelope(&[0, 0, 0]).is_err());
        assert!(parse_udp_envelope(&[0, 0, 0, 1, 8, 8]).is_err());
        assert!(parse_udp_envelope(&[0, 0, 0, 3, 10, b'a']).is_err());
    }
}
