//! Client module for Veilsocks
//!
//! Owns the local SOCKS5 listener and the UDP relay socket, and wires both to
//! the shared tunnel.

#[allow(clippy::module_inception)]
mod client;

pub use client::Client;

use crate::config::Config;
use anyhow::Result;
use tokio::sync::broadcast;

/// Run the client with the given configuration until shutdown
pub async fn run_client(config: Config, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
    let client = Client::new(config).await?;
    client.run(shutdown_rx).await
}
