//! Runtime-agnostic primitives shared by the transport and protocol crates: the
//! lifecycle coordination object, performance counters, the connection abstraction, and
//! the broadcast group.

pub mod broadcast;
pub mod connection;
pub mod counters;
pub mod error;
pub mod lifecycle;
pub mod loopback;

pub use broadcast::BroadcastGroup;
pub use connection::{Connection, ConnectionId, IdAllocator};
pub use counters::{CounterSet, CounterSnapshot};
pub use error::{NetError, NetResult};
pub use lifecycle::Lifecycle;
pub use loopback::{loopback_pair, LoopbackConnection, LoopbackEvents};
