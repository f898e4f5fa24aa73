//! UDP support for SOCKS5
//!
//! UDP ASSOCIATE, envelope parsing, the NAT table and the relay.

mod associate;
mod nat;
mod packet;
mod relay;

pub use associate::handle_udp_associate;
pub use nat::{NatLease, NatTable, RemoteWriter};
pub use packet::{parse_udp_envelope, UdpEnvelope};
pub use relay::UdpRelay;
