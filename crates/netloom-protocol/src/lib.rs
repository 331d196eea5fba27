//! The protocol engine: providers, message processors, the signature and connection
//! registries, the event handler port, and the `Protocol` type tying them together.

pub mod crypto;
pub mod event_handler;
pub mod msg_processor;
pub mod protocol;
pub mod providers;
pub mod registry;

pub use event_handler::{ChannelEventHandler, EventHandler, ProtocolEvent};
pub use msg_processor::MsgProcessor;
pub use protocol::{Protocol, ProtocolHandle};
pub use providers::{AccessProvider, AllowAllAccess, CompressionProvider, CryptoProvider, IdentityCompression, NullCrypto};
pub use registry::{ConnectionRegistry, SignatureRegistry};
