//! The application-facing event port. A [`Protocol`](crate::Protocol) drives its single
//! event-dispatch thread by calling into whatever [`EventHandler`] it was configured
//! with; [`ChannelEventHandler`] is the built-in adapter for callers who would rather
//! drain a channel than implement the trait.

use netloom_core::connection::ConnectionId;
use netloom_core::NetError;
use std::time::Duration;

/// Notified of every connection lifecycle and message event a `Protocol` produces.
/// Called synchronously from the protocol's single event-dispatch thread: a slow or
/// blocking implementation delays every other event behind it.
pub trait EventHandler: Send + Sync {
    fn on_connect(&self, _connection_id: ConnectionId) {}
    fn on_disconnect(&self, _connection_id: ConnectionId) {}
    fn on_receive(&self, _connection_id: ConnectionId, _signature: u16, _message: Box<dyn std::any::Any + Send>) {}
    fn on_timeout(&self, _connection_id: ConnectionId, _error: &NetError) {}
    fn on_error(&self, _connection_id: Option<ConnectionId>, _error: &NetError) {}
    fn on_shutdown(&self) {}
}

/// An event, as republished onto [`ChannelEventHandler`]'s channel.
///
/// Deliberately does not carry `on_receive`'s payload: a deserialized message is a
/// `Box<dyn Any + Send>` whose concrete type only the caller knows, which does not fit a
/// single shared channel. Callers that need typed messages to flow through a channel
/// implement [`EventHandler::on_receive`] directly and downcast there, publishing onto
/// their own typed channel.
#[derive(Debug)]
pub enum ProtocolEvent {
    Connect(ConnectionId),
    Disconnect(ConnectionId),
    Timeout {
        connection_id: ConnectionId,
        description: String,
    },
    Error {
        connection_id: Option<ConnectionId>,
        description: String,
    },
    Shutdown,
}

const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Republishes every event onto a bounded `crossbeam-channel`, for callers who want to
/// drain events from their own thread instead of implementing [`EventHandler`] directly.
/// A send that cannot complete within the delivery timeout is dropped and logged, rather
/// than blocking the protocol's dispatch thread indefinitely.
pub struct ChannelEventHandler {
    tx: crossbeam_channel::Sender<ProtocolEvent>,
    log: netloom_logging::Logger,
    delivery_timeout: Duration,
}

impl ChannelEventHandler {
    /// Builds a handler and its matching receiver, with a channel of `capacity` events
    /// and the default five-second delivery timeout.
    pub fn new(capacity: usize, log: netloom_logging::Logger) -> (ChannelEventHandler, crossbeam_channel::Receiver<ProtocolEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (
            ChannelEventHandler {
                tx,
                log,
                delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            },
            rx,
        )
    }

    fn publish(&self, event: ProtocolEvent) {
        if self.tx.send_timeout(event, self.delivery_timeout).is_err() {
            netloom_logging::error!(self.log, "dropped protocol event: receiver is not keeping up");
        }
    }
}

impl EventHandler for ChannelEventHandler {
    fn on_connect(&self, connection_id: ConnectionId) {
        self.publish(ProtocolEvent::Connect(connection_id));
    }

    fn on_disconnect(&self, connection_id: ConnectionId) {
        self.publish(ProtocolEvent::Disconnect(connection_id));
    }

    fn on_receive(&self, connection_id: ConnectionId, signature: u16, message: Box<dyn std::any::Any + Send>) {
        let _ = message;
        netloom_logging::trace!(self.log, "on_receive dispatched outside channel adapter"; "connection_id" => connection_id, "signature" => signature);
    }

    fn on_timeout(&self, connection_id: ConnectionId, error: &NetError) {
        self.publish(ProtocolEvent::Timeout {
            connection_id,
            description: error.to_string(),
        });
    }

    fn on_error(&self, connection_id: Option<ConnectionId>, error: &NetError) {
        self.publish(ProtocolEvent::Error {
            connection_id,
            description: error.to_string(),
        });
    }

    fn on_shutdown(&self) {
        self.publish(ProtocolEvent::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_disconnect_are_republished() {
        let (handler, rx) = ChannelEventHandler::new(4, netloom_logging::discard());
        handler.on_connect(51);
        handler.on_disconnect(51);

        assert!(matches!(rx.recv().unwrap(), ProtocolEvent::Connect(51)));
        assert!(matches!(rx.recv().unwrap(), ProtocolEvent::Disconnect(51)));
    }

    #[test]
    fn error_without_a_connection_carries_none() {
        let (handler, rx) = ChannelEventHandler::new(4, netloom_logging::discard());
        handler.on_error(None, &NetError::RcvConNil);

        match rx.recv().unwrap() {
            ProtocolEvent::Error { connection_id, .. } => assert_eq!(connection_id, None),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn a_full_channel_drops_rather_than_blocks() {
        let (handler, _rx) = ChannelEventHandler::new(1, netloom_logging::discard());
        let mut handler = handler;
        handler.delivery_timeout = Duration::from_millis(10);

        handler.on_connect(1);
        handler.on_connect(2);
    }
}
