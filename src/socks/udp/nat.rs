//! Per-client UDP session registry
//!
//! Each entry maps a client's source address to the writer of its remote
//! stream and the envelope header captured from the client's first datagram.
//! Registering returns a [`NatLease`]; the task that owns the lease is the
//! only one that removes the entry, which happens when the lease drops.

use crate::transport::StreamDyn;
use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::WriteHalf;
use tokio::sync::Mutex;

/// Shared writer towards one client's remote stream
pub type RemoteWriter = Arc<Mutex<WriteHalf<Box<dyn StreamDyn>>>>;

struct NatEntry {
    writer: RemoteWriter,
    header: Bytes,
    generation: u64,
}

/// Concurrent client-address table
#[derive(Default)]
pub struct NatTable {
    entries: DashMap<SocketAddr, NatEntry>,
    next_generation: AtomicU64,
}

impl NatTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer for `client`, if it has a live entry
    pub fn writer(&self, client: &SocketAddr) -> Option<RemoteWriter> {
        self.entries.get(client).map(|entry| entry.writer.clone())
    }

    /// Envelope header stored for `client`
    pub fn header(&self, client: &SocketAddr) -> Option<Bytes> {
        self.entries.get(client).map(|entry| entry.header.clone())
    }

    /// Whether `client` has a live entry
    pub fn contains(&self, client: &SocketAddr) -> bool {
        self.entries.contains_key(client)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry for `client` and hand back the lease that removes it
    pub fn register(
        self: &Arc<Self>,
        client: SocketAddr,
        writer: RemoteWriter,
        header: Bytes,
    ) -> NatLease {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            client,
            NatEntry {
                writer,
                header,
                generation,
            },
        );
        NatLease {
            table: self.clone(),
            client,
            generation,
        }
    }
}

impl std::fmt::Debug for NatTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Ownership of one NAT entry; dropping it removes the entry
pub struct NatLease {
    table: Arc<NatTable>,
    client: SocketAddr,
    generation: u64,
}

impl NatLease {
    /// Client address the lease covers
    pub fn client(&self) -> SocketAddr {
        self.client
    }
}

impl Drop for NatLease {
    fn drop(&mut self) {
        let generation = self.generation;
        self.table
            .entries
            .remove_if(&self.client, |_, entry| entry.generation == generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> RemoteWriter {
        let (a, _b) = tokio::io::duplex(64);
        let stream: Box<dyn StreamDyn> = Box::new(a);
        Arc::new(Mutex::new(tokio::io::split(stream).1))
    }

    fn client(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let table = Arc::new(NatTable::new());
        let header = Bytes::from_static(&[0, 0, 0, 1, 8, 8, 8, 8, 0, 53]);
        let _lease = table.register(client(5000), writer(), header.clone());

        assert!(table.contains(&client(5000)));
        assert!(table.writer(&client(5000)).is_some());
        assert_eq!(table.header(&client(5000)), Some(header));
        assert!(!table.contains(&client(5001)));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_lease_drop_removes_entry() {
        let table = Arc::new(NatTable::new());
        let lease = table.register(client(5000), writer(), Bytes::new());
        assert_eq!(lease.client(), client(5000));

        drop(lease);
        assert!(!table.contains(&client(5000)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_stale_lease_keeps_newer_entry() {
        let table = Arc::new(NatTable::new());
        let old = table.register(client(5000), writer(), Bytes::from_static(b"old"));
        let _new = table.register(client(5000), writer(), Bytes::from_static(b"new"));

        drop(old);
        assert_eq!(table.header(&client(5000)), Some(Bytes::from_static(b"new")));
    }
}
