//! Helper utilities for Veilsocks
//!
//! Small functions shared by the relay paths.

use std::net::IpAddr;
use std::time::Duration;

/// Default buffer size for IO operations
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default dial and idle timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Parse duration from seconds
pub fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Whether a destination may be reached directly when bypass is enabled
///
/// Covers RFC 1918 and loopback IPv4, plus loopback and unique-local IPv6.
pub fn is_private_or_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return mapped.is_private() || mapped.is_loopback();
            }
            v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}
