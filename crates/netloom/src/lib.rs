//! The facade crate: re-exports the public API of every underlying crate, owns the
//! process-wide connection id allocator, and defines the diagnostics hook external
//! tooling polls.

pub use netloom_config as config;
pub use netloom_core::{
    broadcast::BroadcastGroup, connection::Connection, connection::ConnectionId, connection::IdAllocator, loopback_pair, CounterSet,
    CounterSnapshot, Lifecycle, LoopbackConnection, LoopbackEvents, NetError, NetResult,
};
pub use netloom_logging as logging;
pub use netloom_protocol::{
    AccessProvider, AllowAllAccess, ChannelEventHandler, CompressionProvider, CryptoProvider, EventHandler, IdentityCompression, MsgProcessor,
    NullCrypto, Protocol, ProtocolEvent, ProtocolHandle,
};
pub use netloom_transport_tcp::{TcpEvents, TcpPeer, TcpTransport};
pub use netloom_transport_udp::{UdpEvents, UdpPeer, UdpTransport};
pub use netloom_wire::{Header, Message};

use std::sync::Arc;

/// Lets an external diagnostics server (out of scope for this crate; see
/// `DESIGN.md`) poll a running `Protocol` without reaching into its internals. A
/// `Protocol` implements this directly against its own counter set and connection
/// registry.
pub trait DiagnosticsSource {
    /// The protocol's named counter set, e.g. `Module.Net.Proto.game`.
    fn counters(&self) -> &CounterSet;

    /// The ids of every connection currently registered.
    fn connection_ids(&self) -> Vec<ConnectionId>;
}

/// Builds the single, process-wide connection id allocator. Every `Protocol` and
/// transport in the process shares one instance, wrapped in an `Arc`; id collisions
/// across distinct `Protocol`s are benign since ids are scoped to a connection, not to
/// the protocol that happens to have registered it first.
pub fn shared_id_allocator() -> Arc<IdAllocator> {
    Arc::new(IdAllocator::new())
}

impl DiagnosticsSource for Protocol {
    fn counters(&self) -> &CounterSet {
        Protocol::counters(self)
    }

    fn connection_ids(&self) -> Vec<ConnectionId> {
        Protocol::connection_ids(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_allocator_starts_past_reserved_ids() {
        let allocator = shared_id_allocator();
        assert_eq!(allocator.next(), netloom_core::connection::FIRST_ORDINARY_ID);
    }
}
