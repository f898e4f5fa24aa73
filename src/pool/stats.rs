//! Traffic counters
//!
//! Process-wide byte totals shared by every relay task.

use std::sync::atomic::{AtomicU64, Ordering};

/// Relay traffic statistics
#[derive(Debug, Default)]
pub struct TrafficStats {
    /// Bytes written towards the remote endpoint
    pub bytes_written: AtomicU64,
    /// Bytes delivered back to local clients
    pub bytes_read: AtomicU64,
    /// Logical streams opened on the multiplexed session
    pub streams_opened: AtomicU64,
}

impl TrafficStats {
    /// Create new traffic stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes written towards the remote endpoint
    pub fn record_written(&self, n: usize) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record bytes delivered to a local client
    pub fn record_read(&self, n: usize) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record a logical stream being opened
    pub fn record_stream(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of traffic statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficSnapshot {
    /// Bytes written towards the remote endpoint
    pub bytes_written: u64,
    /// Bytes delivered back to local clients
    pub bytes_read: u64,
    /// Logical streams opened
    pub streams_opened: u64,
}
