//! The per-signature serialization contract. A [`Protocol`](crate::Protocol) owns one
//! [`MsgProcessor`] per message signature and dispatches every inbound message that
//! carries that signature to it, and calls back into it to build an outbound one.

use crate::protocol::ProtocolHandle;
use netloom_core::NetResult;
use netloom_wire::Message;
use std::any::Any;

/// Converts between a typed application message and the wire [`Message`] that carries
/// it. Implementations are registered with a `Protocol` under their own
/// [`MsgProcessor::signature`] and are expected to be stateless past what `init` sets up,
/// since a single instance serves every connection.
pub trait MsgProcessor: Send + Sync {
    /// The message signature this processor owns, in `0..=1023`.
    fn signature(&self) -> u16;

    /// Builds the outbound wire message for `object`. The returned message's signature
    /// is overwritten with [`MsgProcessor::signature`] if it does not already match.
    fn serialize(&self, object: &(dyn Any + Send + Sync)) -> NetResult<Message>;

    /// Reconstructs the application-level value carried by `msg`, having already passed
    /// through the authorize/decrypt/decompress pipeline stages. `access` is the level
    /// the access provider granted the sending connection, for processors that enforce
    /// finer-grained authorization on specific message contents.
    fn deserialize(&self, msg: &Message, access: u8) -> NetResult<Box<dyn Any + Send>>;

    /// Called once when the processor is registered with a protocol, before any message
    /// is dispatched to it. Every connection shares the same processor instance, so this
    /// takes `&self` rather than `&mut self`.
    fn init(&self, _protocol: &ProtocolHandle) {}

    /// Called once when the processor is unregistered or the owning protocol shuts down.
    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use netloom_wire::Message as WireMessage;

    struct EchoText;

    impl MsgProcessor for EchoText {
        fn signature(&self) -> u16 {
            42
        }

        fn serialize(&self, object: &(dyn Any + Send + Sync)) -> NetResult<WireMessage> {
            let text = object.downcast_ref::<String>().expect("EchoText only carries String");
            Ok(WireMessage::build(self.signature(), text.clone().into_bytes())?)
        }

        fn deserialize(&self, msg: &WireMessage, _access: u8) -> NetResult<Box<dyn Any + Send>> {
            let text = String::from_utf8_lossy(msg.payload()).into_owned();
            Ok(Box::new(text))
        }
    }

    #[test]
    fn round_trips_through_serialize_and_deserialize() {
        let processor = EchoText;
        let text: Box<dyn Any + Send + Sync> = Box::new(String::from("hello"));
        let wire = processor.serialize(text.as_ref()).unwrap();

        let restored = processor.deserialize(&wire, 0).unwrap();
        assert_eq!(*restored.downcast::<String>().unwrap(), "hello");
    }
}
