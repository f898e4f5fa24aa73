//! Per-process proxy state
//!
//! Derived once from the validated configuration and passed by value to every
//! component, so nothing depends on hidden globals.

use crate::config::Config;
use crate::helper::duration_from_secs;
use crate::pool::{BufferPool, TrafficStats};
use crate::protocol::{Pipeline, XorCipher};
use std::sync::Arc;
use std::time::Duration;

/// Shared state handed to the relays
#[derive(Debug, Clone)]
pub struct ProxyContext {
    /// The configuration this context was built from
    pub config: Arc<Config>,
    /// XOR pad, present when obfuscation is enabled
    pub cipher: Option<XorCipher>,
    /// Scratch buffers for relay reads
    pub buffers: BufferPool,
    /// Traffic totals
    pub stats: Arc<TrafficStats>,
}

impl ProxyContext {
    /// Build the context for `config`
    pub fn new(config: Config) -> Self {
        let cipher = config
            .obfs
            .then(|| XorCipher::from_passphrase(&config.key));
        let buffers = BufferPool::new(config.buffer_size, config.pool_capacity);
        ProxyContext {
            config: Arc::new(config),
            cipher,
            buffers,
            stats: Arc::new(TrafficStats::new()),
        }
    }

    /// Transform settings for the TCP relay
    pub fn pipeline(&self) -> Pipeline {
        Pipeline {
            cipher: self.cipher,
            compress: self.config.compress,
            padding: self.config.padding,
        }
    }

    /// Dial timeout and UDP idle timeout
    pub fn timeout(&self) -> Duration {
        duration_from_secs(self.config.timeout_secs)
    }
}
