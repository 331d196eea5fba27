//! UDP transport: one shared socket demultiplexed by source address into logical
//! peer connections, with a strict one-datagram-one-message framing rule.

mod peer;
mod reactor;

pub use peer::UdpPeer;
pub use reactor::{UdpEvents, UdpTransport};
