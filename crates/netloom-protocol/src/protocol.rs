//! The protocol engine: the signature and connection registries, the three pluggable
//! providers, performance counters, and the event-dispatch threads that drain whatever
//! transports are attached to it.
//!
//! A `Protocol` does not own a transport itself. It is handed the channel endpoints a
//! transport's reactor already publishes (see `netloom-transport-tcp`/`udp`'s
//! `TcpEvents`/`UdpEvents`) and spawns one fan-in thread per attached transport that
//! runs the receive pipeline and calls into the configured `EventHandler`. This keeps
//! the protocol crate decoupled from any specific transport, the same way the rest of
//! this runtime hands work across threads with `crossbeam-channel` rather than shared
//! mutable state.

use crate::event_handler::EventHandler;
use crate::msg_processor::MsgProcessor;
use crate::providers::{AccessProvider, AllowAllAccess, CompressionProvider, CryptoProvider, IdentityCompression, NullCrypto};
use crate::registry::{ConnectionRegistry, SignatureRegistry};
use crossbeam_channel::{Receiver, Select};
use netloom_core::connection::{Connection, ConnectionId};
use netloom_core::{CounterSet, NetError, NetResult};
use netloom_logging::Logger;
use netloom_wire::Message;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_TIMEOUT: Duration = Duration::from_millis(250);

const COUNTER_NAMES: &[&str] = &[
    "RecvTotal",
    "RecvBytes",
    "RecvChecksumFail",
    "RecvNoConnection",
    "RecvNoAccess",
    "RecvNoProvider",
    "RecvDecryptFail",
    "RecvDecompressFail",
    "RecvDeserializeFail",
    "RecvDispatched",
    "SendTotal",
    "SendBytes",
    "SendNoProvider",
    "SendSerializeFail",
    "SendCompressFail",
    "SendEncryptFail",
    "SendFail",
    "ConnectTotal",
    "DisconnectTotal",
    "TimeoutConnect",
    "TimeoutDisconnect",
    "TimeoutGeneral",
    "TimeoutRcv",
    "TimeoutSend",
];

struct Counter;
impl Counter {
    const RECV_TOTAL: usize = 0;
    const RECV_BYTES: usize = 1;
    const RECV_CHECKSUM_FAIL: usize = 2;
    const RECV_NO_CONNECTION: usize = 3;
    const RECV_NO_ACCESS: usize = 4;
    const RECV_NO_PROVIDER: usize = 5;
    const RECV_DECRYPT_FAIL: usize = 6;
    const RECV_DECOMPRESS_FAIL: usize = 7;
    const RECV_DESERIALIZE_FAIL: usize = 8;
    const RECV_DISPATCHED: usize = 9;
    const SEND_TOTAL: usize = 10;
    const SEND_BYTES: usize = 11;
    const SEND_NO_PROVIDER: usize = 12;
    const SEND_SERIALIZE_FAIL: usize = 13;
    const SEND_COMPRESS_FAIL: usize = 14;
    const SEND_ENCRYPT_FAIL: usize = 15;
    const SEND_FAIL: usize = 16;
    const CONNECT_TOTAL: usize = 17;
    const DISCONNECT_TOTAL: usize = 18;
    const TIMEOUT_CONNECT: usize = 19;
    const TIMEOUT_DISCONNECT: usize = 20;
    const TIMEOUT_GENERAL: usize = 21;
    const TIMEOUT_RCV: usize = 22;
    const TIMEOUT_SEND: usize = 23;
}

/// The counter a timeout-kind `NetError` should be tallied under, or `None` if `error`
/// is not a timeout at all.
fn timeout_counter(error: &NetError) -> Option<usize> {
    match error {
        NetError::TimeoutConnect => Some(Counter::TIMEOUT_CONNECT),
        NetError::TimeoutDisconnect => Some(Counter::TIMEOUT_DISCONNECT),
        NetError::TimeoutGeneral => Some(Counter::TIMEOUT_GENERAL),
        NetError::TimeoutRcv => Some(Counter::TIMEOUT_RCV),
        NetError::TimeoutSend(_) => Some(Counter::TIMEOUT_SEND),
        _ => None,
    }
}

struct Inner {
    signatures: SignatureRegistry,
    connections: ConnectionRegistry,
    access: parking_lot::RwLock<Arc<dyn AccessProvider>>,
    compression: parking_lot::RwLock<Arc<dyn CompressionProvider>>,
    crypto: parking_lot::RwLock<Arc<dyn CryptoProvider>>,
    event_handler: parking_lot::RwLock<Arc<dyn EventHandler>>,
    counters: CounterSet,
    log: Logger,
    alive: Arc<AtomicBool>,
}

/// A cheaply-clonable, narrow view into a `Protocol` handed to [`MsgProcessor::init`].
/// Exposes only what a processor legitimately needs: its own counters and the ability to
/// look up another live connection.
#[derive(Clone)]
pub struct ProtocolHandle {
    inner: Arc<Inner>,
}

impl ProtocolHandle {
    pub fn counters(&self) -> &CounterSet {
        &self.inner.counters
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Arc<dyn Connection>> {
        self.inner.connections.get(id)
    }
}

/// Ties the signature registry, connection registry, providers, and event handler
/// together and runs the receive pipeline for every transport attached to it.
#[derive(Clone)]
pub struct Protocol {
    inner: Arc<Inner>,
}

impl Protocol {
    /// Builds a protocol named `name` (used as the counter set's name, conventionally
    /// `Module.Net.Proto.<name>`) with every provider defaulted to its no-op
    /// implementation and the given event handler.
    pub fn new(name: impl Into<String>, event_handler: Arc<dyn EventHandler>, log: Logger) -> Protocol {
        Protocol {
            inner: Arc::new(Inner {
                signatures: SignatureRegistry::new(),
                connections: ConnectionRegistry::new(),
                access: parking_lot::RwLock::new(Arc::new(AllowAllAccess)),
                compression: parking_lot::RwLock::new(Arc::new(IdentityCompression)),
                crypto: parking_lot::RwLock::new(Arc::new(NullCrypto)),
                event_handler: parking_lot::RwLock::new(event_handler),
                counters: CounterSet::new(name, COUNTER_NAMES),
                log,
                alive: Arc::new(AtomicBool::new(true)),
            }),
        }
    }

    pub fn counters(&self) -> &CounterSet {
        &self.inner.counters
    }

    /// The ids of every connection currently registered, for diagnostics polling.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.inner.connections.ids()
    }

    pub fn handle(&self) -> ProtocolHandle {
        ProtocolHandle {
            inner: self.inner.clone(),
        }
    }

    /// Registers a message processor. Returns `false` without installing it if its
    /// signature is already taken.
    pub fn register_processor(&self, processor: impl MsgProcessor + 'static) -> bool {
        processor.init(&self.handle());
        self.inner.signatures.register(Arc::new(processor))
    }

    pub fn set_access_provider(&self, provider: Arc<dyn AccessProvider>) {
        let previous = std::mem::replace(&mut *self.inner.access.write(), provider);
        previous.close();
    }

    pub fn set_compression_provider(&self, provider: Arc<dyn CompressionProvider>) {
        let previous = std::mem::replace(&mut *self.inner.compression.write(), provider);
        previous.close();
    }

    pub fn set_crypto_provider(&self, provider: Arc<dyn CryptoProvider>) {
        let previous = std::mem::replace(&mut *self.inner.crypto.write(), provider);
        previous.close();
    }

    /// Authorizes and registers a connection so the receive pipeline can look it up and
    /// the send path can target it directly by id. `AccessProvider::authorize` is called
    /// here as well as on every inbound message (see `handle_inbound`); a connection the
    /// access provider denies is closed immediately and never registered.
    pub fn register_connection(&self, connection: Arc<dyn Connection>) {
        let id = connection.id();

        if self.inner.access.read().authorize(id, connection.key()).is_none() {
            self.inner.counters.increment(Counter::RECV_NO_ACCESS);
            self.inner.fail(Some(id), NetError::NoAccess);
            connection.close();
            return;
        }

        self.inner.counters.increment(Counter::CONNECT_TOTAL);
        self.inner.connections.insert(connection.clone());
        self.inner.event_handler.read().on_connect(id);
    }

    pub fn remove_connection(&self, id: ConnectionId) {
        if self.inner.connections.remove(id).is_some() {
            self.inner.counters.increment(Counter::DISCONNECT_TOTAL);
            self.inner.event_handler.read().on_disconnect(id);
        }
    }

    /// Runs the full authorize -> decrypt -> decompress -> deserialize -> dispatch
    /// pipeline against one assembled, CRC-valid-or-not message.
    pub fn handle_inbound(&self, connection_id: ConnectionId, message: Message) {
        self.inner.handle_inbound(connection_id, message);
    }

    /// Routes a transport-reported error to the event handler. Timeout-kind errors are
    /// counted separately and delivered through `on_timeout` rather than `on_error`, so
    /// `EventHandler::on_timeout` actually fires for send/receive/connect/disconnect
    /// deadlines raised by an attached transport.
    pub fn handle_transport_error(&self, connection_id: ConnectionId, error: NetError) {
        match timeout_counter(&error) {
            Some(counter) => {
                self.inner.counters.increment(counter);
                self.inner.event_handler.read().on_timeout(connection_id, &error);
            }
            None => {
                self.inner.event_handler.read().on_error(Some(connection_id), &error);
            }
        }
    }

    /// Runs the serialize -> compress -> encrypt -> send pipeline and hands the result to
    /// the connection registered under `connection_id`.
    pub fn send(&self, connection_id: ConnectionId, signature: u16, object: &(dyn Any + Send + Sync), timeout_secs: u32) -> NetResult<()> {
        self.inner.send(connection_id, signature, object, timeout_secs)
    }

    /// Spawns a fan-in thread that drains `connect_rx`/`disconnect_rx`/`inbound_rx`
    /// (and, if present, `error_rx`) and runs the matching pipeline stage for each.
    /// Returns the thread's join handle so the caller can track it alongside the
    /// transport's own handle.
    pub fn attach<C: Connection + 'static>(
        &self,
        connect_rx: Receiver<Arc<C>>,
        disconnect_rx: Receiver<ConnectionId>,
        inbound_rx: Receiver<(ConnectionId, Message)>,
        error_rx: Option<Receiver<(ConnectionId, NetError)>>,
    ) -> JoinHandle<()> {
        let protocol = self.clone();
        let alive = self.inner.alive.clone();

        thread::spawn(move || {
            while alive.load(Ordering::Acquire) {
                let mut select = Select::new();
                let connect_idx = select.recv(&connect_rx);
                let disconnect_idx = select.recv(&disconnect_rx);
                let inbound_idx = select.recv(&inbound_rx);
                let error_idx = error_rx.as_ref().map(|rx| select.recv(rx));

                let oper = match select.select_timeout(POLL_TIMEOUT) {
                    Ok(oper) => oper,
                    Err(_) => continue,
                };

                let index = oper.index();
                if index == connect_idx {
                    match oper.recv(&connect_rx) {
                        Ok(peer) => protocol.register_connection(peer),
                        Err(_) => break,
                    }
                } else if index == disconnect_idx {
                    match oper.recv(&disconnect_rx) {
                        Ok(id) => protocol.remove_connection(id),
                        Err(_) => break,
                    }
                } else if index == inbound_idx {
                    match oper.recv(&inbound_rx) {
                        Ok((id, message)) => protocol.handle_inbound(id, message),
                        Err(_) => break,
                    }
                } else if Some(index) == error_idx {
                    if let Some(rx) = error_rx.as_ref() {
                        match oper.recv(rx) {
                            Ok((id, error)) => protocol.handle_transport_error(id, error),
                            Err(_) => break,
                        }
                    }
                }
            }
        })
    }

    /// Stops accepting work from attached transports, closes every registered
    /// connection, every provider, and every message processor, and notifies the event
    /// handler. Does not join the threads returned by [`Protocol::attach`]; the caller
    /// does that after shutting down the transports feeding them.
    pub fn shutdown(&self) {
        self.inner.alive.store(false, Ordering::Release);
        self.inner.connections.close_all();
        self.inner.signatures.close();
        self.inner.access.read().close();
        self.inner.compression.read().close();
        self.inner.crypto.read().close();
        self.inner.event_handler.read().on_shutdown();
    }
}

impl Inner {
    fn handle_inbound(&self, connection_id: ConnectionId, message: Message) {
        self.counters.increment(Counter::RECV_TOTAL);
        self.counters.add(Counter::RECV_BYTES, message.payload().len() as u64);

        if !message.is_valid() {
            self.counters.increment(Counter::RECV_CHECKSUM_FAIL);
            self.fail(Some(connection_id), NetError::RcvChecksum);
            return;
        }

        let connection = match self.connections.get(connection_id) {
            Some(connection) => connection,
            None => {
                self.counters.increment(Counter::RECV_NO_CONNECTION);
                self.fail(Some(connection_id), NetError::RcvConNil);
                return;
            }
        };

        let access = match self.access.read().authorize(connection_id, connection.key()) {
            Some(access) => access,
            None => {
                self.counters.increment(Counter::RECV_NO_ACCESS);
                self.fail(Some(connection_id), NetError::NoAccess);
                self.close_violating_connection(connection_id, &connection);
                return;
            }
        };

        let header = message.header();
        let processor = match self.signatures.get(header.signature()) {
            Some(processor) => processor,
            None => {
                self.counters.increment(Counter::RECV_NO_PROVIDER);
                self.fail(Some(connection_id), NetError::NoProvider(header.signature()));
                self.close_violating_connection(connection_id, &connection);
                return;
            }
        };

        let mut bytes = message.into_payload();

        if header.encrypted() {
            bytes = match self.crypto.read().decrypt(&bytes, connection_id) {
                Ok(bytes) => bytes,
                Err(_) => {
                    self.counters.increment(Counter::RECV_DECRYPT_FAIL);
                    self.fail(Some(connection_id), NetError::RcvDecrypt);
                    return;
                }
            };
        }

        if header.compressed() {
            bytes = match self.compression.read().decompress(&bytes) {
                Ok(bytes) => bytes,
                Err(_) => {
                    self.counters.increment(Counter::RECV_DECOMPRESS_FAIL);
                    self.fail(Some(connection_id), NetError::RcvDecompress);
                    return;
                }
            };
        }

        let plain_message = match Message::build(header.signature(), bytes) {
            Ok(plain_message) => plain_message,
            Err(err) => {
                self.counters.increment(Counter::RECV_DESERIALIZE_FAIL);
                self.fail(Some(connection_id), err.into());
                return;
            }
        };

        match processor.deserialize(&plain_message, access) {
            Ok(object) => {
                self.counters.increment(Counter::RECV_DISPATCHED);
                self.event_handler.read().on_receive(connection_id, header.signature(), object);
            }
            Err(_) => {
                self.counters.increment(Counter::RECV_DESERIALIZE_FAIL);
                self.fail(Some(connection_id), NetError::Deserialize(format!("signature {}", header.signature())));
            }
        }
    }

    fn send(&self, connection_id: ConnectionId, signature: u16, object: &(dyn Any + Send + Sync), timeout_secs: u32) -> NetResult<()> {
        self.counters.increment(Counter::SEND_TOTAL);

        let connection = self.connections.get(connection_id).ok_or_else(|| {
            self.counters.increment(Counter::SEND_FAIL);
            NetError::SendInvalidCli(connection_id)
        })?;

        let processor = self.signatures.get(signature).ok_or_else(|| {
            self.counters.increment(Counter::SEND_NO_PROVIDER);
            NetError::NoProvider(signature)
        })?;

        let built = processor.serialize(object).map_err(|err| {
            self.counters.increment(Counter::SEND_SERIALIZE_FAIL);
            err
        })?;
        let plain = built.into_payload();

        let compression = self.compression.read().clone();
        let compressed_bytes = compression.compress(&plain).map_err(|err| {
            self.counters.increment(Counter::SEND_COMPRESS_FAIL);
            err
        })?;
        let compressed_flag = !compression.is_passthrough();

        let crypto = self.crypto.read().clone();
        let cipher_bytes = crypto.encrypt(&compressed_bytes, connection_id).map_err(|err| {
            self.counters.increment(Counter::SEND_ENCRYPT_FAIL);
            err
        })?;
        let encrypted_flag = !crypto.is_passthrough();

        let wire = Message::build_with_flags(signature, cipher_bytes, compressed_flag, encrypted_flag)?;
        self.counters.add(Counter::SEND_BYTES, wire.payload().len() as u64);

        connection.send(&wire.to_bytes(), timeout_secs).map_err(|err| {
            self.counters.increment(Counter::SEND_FAIL);
            err
        })
    }

    fn fail(&self, connection_id: Option<ConnectionId>, error: NetError) {
        netloom_logging::debug!(self.log, "pipeline stage failed"; "connection_id" => ?connection_id, "error" => %error);
        self.event_handler.read().on_error(connection_id, &error);
    }

    /// Closes a connection that broke a pipeline invariant (denied access, unknown
    /// signature) and removes it from the registry, notifying the event handler the same
    /// way a transport-initiated disconnect would.
    fn close_violating_connection(&self, connection_id: ConnectionId, connection: &Arc<dyn Connection>) {
        connection.close();
        if self.connections.remove(connection_id).is_some() {
            self.counters.increment(Counter::DISCONNECT_TOTAL);
            self.event_handler.read().on_disconnect(connection_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_handler::ChannelEventHandler;
    use crate::event_handler::ProtocolEvent;
    use crate::msg_processor::MsgProcessor;
    use netloom_wire::Message as WireMessage;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicU32;

    struct EchoProcessor;

    impl MsgProcessor for EchoProcessor {
        fn signature(&self) -> u16 {
            7
        }

        fn serialize(&self, object: &(dyn Any + Send + Sync)) -> NetResult<WireMessage> {
            let text = object.downcast_ref::<String>().unwrap();
            Ok(WireMessage::build(self.signature(), text.clone().into_bytes())?)
        }

        fn deserialize(&self, msg: &WireMessage, _access: u8) -> NetResult<Box<dyn Any + Send>> {
            Ok(Box::new(String::from_utf8_lossy(msg.payload()).into_owned()))
        }
    }

    struct CapturingConnection {
        id: ConnectionId,
        sent: parking_lot::Mutex<Vec<Vec<u8>>>,
        closed: AtomicBool,
    }

    impl CapturingConnection {
        fn new(id: ConnectionId) -> CapturingConnection {
            CapturingConnection {
                id,
                sent: parking_lot::Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }
        }
    }

    impl Connection for CapturingConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }
        fn local_addr(&self) -> Option<SocketAddr> {
            None
        }
        fn send(&self, bytes: &[u8], _timeout_secs: u32) -> NetResult<()> {
            self.sent.lock().push(bytes.to_vec());
            Ok(())
        }
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct DenyAllAccess;

    impl crate::providers::AccessProvider for DenyAllAccess {
        fn authorize(&self, _connection_id: ConnectionId, _key: Option<&[u8]>) -> Option<u8> {
            None
        }
    }

    fn test_protocol() -> (Protocol, crossbeam_channel::Receiver<ProtocolEvent>) {
        let (handler, rx) = ChannelEventHandler::new(16, netloom_logging::discard());
        let protocol = Protocol::new("test", Arc::new(handler), netloom_logging::discard());
        protocol.register_processor(EchoProcessor);
        (protocol, rx)
    }

    #[test]
    fn inbound_message_with_unknown_connection_raises_an_error_event() {
        let (protocol, rx) = test_protocol();
        let wire = WireMessage::build(7, b"hi".to_vec()).unwrap();
        protocol.handle_inbound(51, wire);

        match rx.recv().unwrap() {
            ProtocolEvent::Error { connection_id, .. } => assert_eq!(connection_id, Some(51)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn send_round_trips_through_the_registered_processor() {
        let (protocol, _rx) = test_protocol();
        let connection = Arc::new(CapturingConnection::new(51));
        protocol.register_connection(connection.clone());

        let text: Box<dyn Any + Send + Sync> = Box::new(String::from("payload"));
        protocol.send(51, 7, text.as_ref(), 15).unwrap();

        let sent = connection.sent.lock();
        assert_eq!(sent.len(), 1);

        let mut msg = WireMessage::new();
        let (_, complete) = msg.add_data(&sent[0]);
        assert!(complete);
        assert!(msg.is_valid());
        assert_eq!(msg.payload(), b"payload");
    }

    #[test]
    fn send_to_an_unregistered_connection_fails() {
        let (protocol, _rx) = test_protocol();
        let text: Box<dyn Any + Send + Sync> = Box::new(String::from("payload"));
        assert!(protocol.send(999, 7, text.as_ref(), 15).is_err());
    }

    #[test]
    fn attach_bridges_transport_channels_into_the_pipeline() {
        let (protocol, _rx) = test_protocol();

        let (connect_tx, connect_rx) = crossbeam_channel::unbounded::<Arc<CapturingConnection>>();
        let (_disconnect_tx, disconnect_rx) = crossbeam_channel::unbounded();
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();

        let next_id = AtomicU32::new(51);
        let connection = Arc::new(CapturingConnection::new(next_id.load(Ordering::Relaxed)));
        connect_tx.send(connection.clone()).unwrap();

        let wire = WireMessage::build(7, b"hello".to_vec()).unwrap();
        inbound_tx.send((connection.id, wire)).unwrap();

        let handle = protocol.attach(connect_rx, disconnect_rx, inbound_rx, None);
        thread::sleep(Duration::from_millis(50));
        protocol.shutdown();
        drop(connect_tx);
        drop(inbound_tx);
        let _ = handle.join();

        assert_eq!(protocol.inner.connections.len(), 0);
    }

    #[test]
    fn inbound_message_with_unknown_signature_closes_the_connection() {
        let (protocol, rx) = test_protocol();
        let connection = Arc::new(CapturingConnection::new(51));
        protocol.register_connection(connection.clone());
        let _ = rx.recv().unwrap();

        let wire = WireMessage::build(999, b"hi".to_vec()).unwrap();
        protocol.handle_inbound(51, wire);

        assert!(connection.closed.load(Ordering::SeqCst));
        assert_eq!(protocol.inner.connections.len(), 0);

        match rx.recv().unwrap() {
            ProtocolEvent::Error { connection_id, .. } => assert_eq!(connection_id, Some(51)),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().unwrap() {
            ProtocolEvent::Disconnect(id) => assert_eq!(id, 51),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn register_connection_with_denied_access_closes_it_without_registering() {
        let (protocol, rx) = test_protocol();
        protocol.set_access_provider(Arc::new(DenyAllAccess));
        let connection = Arc::new(CapturingConnection::new(51));

        protocol.register_connection(connection.clone());

        assert!(connection.closed.load(Ordering::SeqCst));
        assert_eq!(protocol.inner.connections.len(), 0);
        match rx.recv().unwrap() {
            ProtocolEvent::Error { connection_id, .. } => assert_eq!(connection_id, Some(51)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn transport_timeout_errors_route_to_on_timeout_not_on_error() {
        let (protocol, rx) = test_protocol();
        protocol.handle_transport_error(51, NetError::TimeoutSend(7));

        match rx.recv().unwrap() {
            ProtocolEvent::Timeout { connection_id, .. } => assert_eq!(connection_id, 51),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(protocol.counters().get(Counter::TIMEOUT_SEND).value, 1);
    }
}
