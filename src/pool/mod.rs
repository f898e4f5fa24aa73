//! Buffer pool module for Veilsocks
//!
//! Scratch buffers for relay reads are drawn from one process-wide pool and
//! handed back through an RAII guard. The traffic counters live here too.

mod guard;
mod stats;

pub use guard::PooledBuffer;
pub use stats::{TrafficSnapshot, TrafficStats};

use guard::FreeList;
use std::sync::{Arc, Mutex};

/// Fixed-size buffer pool
#[derive(Clone)]
pub struct BufferPool {
    free: Arc<FreeList>,
    buffer_size: usize,
}

impl BufferPool {
    /// Create a pool of `buffer_size` buffers keeping at most `capacity` idle
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        BufferPool {
            free: Arc::new(FreeList {
                buffers: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
            }),
            buffer_size,
        }
    }

    /// Take a buffer, allocating when none is idle
    pub fn get(&self) -> PooledBuffer {
        let reused = match self.free.buffers.lock() {
            Ok(mut buffers) => buffers.pop(),
            Err(poisoned) => poisoned.into_inner().pop(),
        };
        let buf = reused.unwrap_or_else(|| vec![0u8; self.buffer_size]);
        PooledBuffer::new(buf, self.free.clone())
    }

    /// Size of every buffer handed out
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of buffers currently idle in the pool
    pub fn idle(&self) -> usize {
        match self.free.buffers.lock() {
            Ok(buffers) => buffers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.buffer_size)
            .field("idle", &self.idle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_get_has_configured_size() {
        let pool = BufferPool::new(64, 2);
        let buf = pool.get();
        assert_eq!(buf.len(), 64);
        assert_eq!(pool.buffer_size(), 64);
    }

    #[test]
    fn test_pool_reuses_buffers() {
        let pool = BufferPool::new(32, 2);
        assert_eq!(pool.idle(), 0);

        let a = pool.get();
        let b = pool.get();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);

        let _c = pool.get();
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_pool_caps_idle_buffers() {
        let pool = BufferPool::new(8, 1);
        let bufs: Vec<_> = (0..3).map(|_| pool.get()).collect();
        drop(bufs);
        assert_eq!(pool.idle(), 1);
    }
}
