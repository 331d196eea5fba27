//! TCP transport: accept/dial plus the single-poll-loop reactor that reassembles
//! inbound bytes into framed messages and force-flushes queued outbound bytes every
//! tick.

mod peer;
mod reactor;

pub use peer::TcpPeer;
pub use reactor::{TcpEvents, TcpTransport};
