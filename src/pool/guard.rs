//! RAII guard for pooled buffers
//!
//! Provides automatic return of scratch buffers to the pool when dropped.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Shared free list behind a [`BufferPool`](super::BufferPool)
pub(super) struct FreeList {
    pub(super) buffers: Mutex<Vec<Vec<u8>>>,
    pub(super) capacity: usize,
}

impl FreeList {
    fn put(&self, buf: Vec<u8>) {
        let mut buffers = match self.buffers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if buffers.len() < self.capacity {
            buffers.push(buf);
        }
    }
}

/// RAII guard that returns the buffer to the pool on drop
///
/// The buffer always has the pool's configured length. Dropping the guard on
/// any exit path, error paths included, hands the allocation back.
pub struct PooledBuffer {
    /// The buffer (Option to allow taking in drop)
    buf: Option<Vec<u8>>,
    /// Pool the buffer returns to
    home: Arc<FreeList>,
}

impl PooledBuffer {
    pub(super) fn new(buf: Vec<u8>, home: Arc<FreeList>) -> Self {
        PooledBuffer {
            buf: Some(buf),
            home,
        }
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.home.put(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_list(capacity: usize) -> Arc<FreeList> {
        Arc::new(FreeList {
            buffers: Mutex::new(Vec::new()),
            capacity,
        })
    }

    #[test]
    fn test_guard_drop_returns_to_pool() {
        let home = free_list(1);

        {
            let mut guard = PooledBuffer::new(vec![0u8; 16], home.clone());
            guard[0] = 7;
            assert_eq!(guard.len(), 16);
        }

        let buffers = home.buffers.lock().unwrap();
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0][0], 7);
    }

    #[test]
    fn test_guard_drop_respects_capacity() {
        let home = free_list(1);

        let a = PooledBuffer::new(vec![0u8; 4], home.clone());
        let b = PooledBuffer::new(vec![0u8; 4], home.clone());
        drop(a);
        drop(b);

        assert_eq!(home.buffers.lock().unwrap().len(), 1);
    }
}
