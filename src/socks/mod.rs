//! SOCKS5 front-end for Veilsocks
//!
//! Local clients speak plain SOCKS5 to this module. CONNECT requests are
//! carried over the tunnel (or dialled directly when bypassed), UDP
//! ASSOCIATE requests share one relay socket.

mod command;
mod consts;
mod handler;
mod tcp_relay;
mod types;
pub mod udp;

pub use command::{build_reply, parse_connect_target, reply_bytes};
pub use consts::*;
pub use handler::{check_version, dispatch, handle_socks5};
pub use tcp_relay::{handle_tcp_connect, relay_tcp, TcpProxy};
pub use types::{SocksCommand, TargetAddr};
pub use udp::{NatTable, UdpRelay};
