//! Server address with cached resolution
//!
//! The resolved address is remembered between dials and dropped after a
//! failed dial so the next session re-resolves.

use crate::error::{Result, VeilError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Address that may have a cached resolved address
#[derive(Debug, Clone)]
pub struct AddrMaybeCached {
    /// The original address string
    addr: String,
    /// Cached resolved address
    cached: Arc<RwLock<Option<SocketAddr>>>,
}

impl AddrMaybeCached {
    /// Create a new address without cached resolution
    pub fn new(addr: &str) -> Self {
        AddrMaybeCached {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the original address string
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Host part of the address, without brackets for IPv6 literals
    pub fn host(&self) -> &str {
        let host = match self.addr.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => host,
            _ => self.addr.as_str(),
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }

    /// Clear the cached address
    pub async fn clear_cache(&self) {
        *self.cached.write().await = None;
    }

    /// Resolve the address, using cache if available
    pub async fn resolve(&self) -> Result<SocketAddr> {
        if let Some(addr) = *self.cached.read().await {
            return Ok(addr);
        }

        let resolved = tokio::net::lookup_host(&self.addr)
            .await
            .map_err(|e| VeilError::Transport(format!("failed to resolve {}: {}", self.addr, e)))?
            .next()
            .ok_or_else(|| VeilError::Transport(format!("no addresses found for {}", self.addr)))?;

        *self.cached.write().await = Some(resolved);
        Ok(resolved)
    }
}

impl std::fmt::Display for AddrMaybeCached {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.addr)
    }
}
