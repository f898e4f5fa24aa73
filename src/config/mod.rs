//! Configuration module for Veilsocks
//!
//! A flat configuration record loaded from an optional TOML file and
//! overridden by command-line flags in the binary.

mod transport;

pub use transport::TransportType;

use crate::context::ProxyContext;
use crate::error::VeilError;
use crate::helper::{DEFAULT_BUFFER_SIZE, DEFAULT_TIMEOUT_SECS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

fn default_local_addr() -> String {
    "127.0.0.1:1080".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_pool_capacity() -> usize {
    128
}

fn default_ws_path() -> String {
    "/opensocks".to_string()
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Local SOCKS5 listen address, shared by the TCP listener and UDP relay
    #[serde(default = "default_local_addr")]
    pub local_addr: String,

    /// Remote endpoint address (e.g. "server.example.com:8081")
    #[serde(default)]
    pub server_addr: String,

    /// Shared pre-key, also the obfuscation passphrase
    #[serde(default)]
    pub key: String,

    /// Transport selector
    #[serde(default)]
    pub protocol: TransportType,

    /// Run as the remote peer (not provided by this crate)
    #[serde(default)]
    pub server_mode: bool,

    /// Connect directly to private and loopback destinations
    #[serde(default)]
    pub bypass: bool,

    /// XOR-obfuscate handshake and relayed payloads
    #[serde(default)]
    pub obfs: bool,

    /// Snappy-compress relayed TCP payloads
    #[serde(default)]
    pub compress: bool,

    /// Pad relayed TCP payloads into the shape-masking band
    #[serde(default)]
    pub padding: bool,

    /// Verbose logging
    #[serde(default)]
    pub verbose: bool,

    /// Dial timeout and UDP idle timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Size of each scratch buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Number of idle scratch buffers kept by the pool
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,

    /// Skip certificate verification for `wss`
    #[serde(default)]
    pub insecure: bool,

    /// HTTP path used for the WebSocket upgrade
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            local_addr: default_local_addr(),
            server_addr: String::new(),
            key: String::new(),
            protocol: TransportType::default(),
            server_mode: false,
            bypass: false,
            obfs: false,
            compress: false,
            padding: false,
            verbose: false,
            timeout_secs: default_timeout_secs(),
            buffer_size: default_buffer_size(),
            pool_capacity: default_pool_capacity(),
            insecure: false,
            ws_path: default_ws_path(),
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), VeilError> {
        if self.server_mode {
            return Err(VeilError::Config(
                "server mode is not provided by this build".to_string(),
            ));
        }
        if self.server_addr.trim().is_empty() {
            return Err(VeilError::Config("server_addr must be set".to_string()));
        }
        if self.local_addr.parse::<SocketAddr>().is_err() {
            return Err(VeilError::Config(format!(
                "local_addr is not a socket address: {}",
                self.local_addr
            )));
        }
        if self.protocol == TransportType::Kcp {
            return Err(VeilError::Config(
                "the kcp transport is not supported".to_string(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(VeilError::Config("buffer_size must be positive".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(VeilError::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Derive the per-process state shared by every component
    pub fn init(self) -> ProxyContext {
        ProxyContext::new(self)
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}
