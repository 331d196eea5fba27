//! The polymorphic endpoint abstraction every transport and the broadcast group
//! implement: a [`Connection`] is anything that can be sent bytes and closed.

use crate::error::NetResult;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Connection ids below this are reserved for well-known group objects (see
/// [`IdAllocator`]); ordinary endpoints are always allocated at or above it.
pub const FIRST_ORDINARY_ID: u32 = 51;

pub type ConnectionId = u32;

/// A polymorphic endpoint: a TCP peer, a UDP peer, or a [`crate::BroadcastGroup`].
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;
    fn key(&self) -> Option<&[u8]> {
        None
    }
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
    fn send(&self, bytes: &[u8], timeout_secs: u32) -> NetResult<()>;
    /// Closes the connection. Must be safe to call more than once.
    fn close(&self);
}

/// Process-wide allocator of [`ConnectionId`]s, shared by every `Protocol` that needs
/// one. Deliberately not a hidden global: the embedding process constructs a single
/// instance and hands it, wrapped in an `Arc`, to each `Protocol` it creates.
pub struct IdAllocator {
    next: AtomicU32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        IdAllocator::new()
    }
}

impl IdAllocator {
    pub fn new() -> IdAllocator {
        IdAllocator {
            next: AtomicU32::new(FIRST_ORDINARY_ID),
        }
    }

    /// Allocates the next ordinary connection id.
    #[inline]
    pub fn next(&self) -> ConnectionId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
