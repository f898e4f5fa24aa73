//! # Veilsocks - Local SOCKS5 Front-End over an Obfuscated Tunnel
//!
//! Veilsocks accepts SOCKS5 clients on a local address and carries their
//! traffic to a remote peer over a single multiplexed transport connection.
//! Each client connection becomes one logical stream on that session.
//!
//! ## Features
//!
//! - **Lazy Shared Session**: the transport connection is dialled on first use
//!   and re-established after any open or handshake failure
//! - **Pluggable Transports**: plain TCP, WebSocket, or WebSocket over TLS
//! - **Payload Transforms**: XOR obfuscation, snappy compression and
//!   length padding, applied per direction and inverted on the return path
//! - **UDP ASSOCIATE**: one shared relay socket with a per-client NAT table
//! - **Private Bypass**: private and loopback destinations can skip the tunnel
//!
//! ## Usage
//!
//! ```rust,ignore
//! use veilsocks::config::load_config;
//! use veilsocks::client::run_client;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("veilsocks.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_client(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Veilsocks -> [handshake | frames] -> mux stream -> Remote Peer -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod helper;
pub mod pool;
pub mod protocol;
pub mod socks;
pub mod transport;
pub mod tunnel;

// Re-export commonly used items
pub use client::{run_client, Client};
pub use config::{load_config, Config};
pub use context::ProxyContext;
pub use error::{Socks5Error, VeilError};
pub use tunnel::Tunnel;

/// Version of the Veilsocks library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
