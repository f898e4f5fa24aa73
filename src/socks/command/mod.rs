//! SOCKS5 command parsing module
//!
//! Handles parsing SOCKS5 commands and building replies.

mod parser;
mod reply;

pub use parser::parse_connect_target;
pub use reply::{build_reply, reply_bytes, send_no_auth};
