//! Cross-crate integration tests exercising the full stack: binding a listener,
//! dialing it, sending a message end to end through a `Protocol`, and shutting
//! everything back down.

use netloom::{loopback_pair, AllowAllAccess, Connection, ConnectionId, EventHandler, Lifecycle, Message, MsgProcessor, NetResult, Protocol, TcpTransport};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct TextProcessor;

impl MsgProcessor for TextProcessor {
    fn signature(&self) -> u16 {
        1
    }

    fn serialize(&self, object: &(dyn Any + Send + Sync)) -> NetResult<Message> {
        let text = object.downcast_ref::<String>().expect("TextProcessor only carries String");
        Ok(Message::build(self.signature(), text.clone().into_bytes())?)
    }

    fn deserialize(&self, msg: &Message, _access: u8) -> NetResult<Box<dyn Any + Send>> {
        Ok(Box::new(String::from_utf8_lossy(msg.payload()).into_owned()))
    }
}

struct CountingHandler {
    received: Arc<AtomicUsize>,
}

impl EventHandler for CountingHandler {
    fn on_receive(&self, _connection_id: ConnectionId, _signature: u16, message: Box<dyn Any + Send>) {
        let text = message.downcast::<String>().expect("TextProcessor always produces String");
        assert_eq!(*text, "hello over the wire");
        self.received.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_until(received: &AtomicUsize, count: usize) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while received.load(Ordering::SeqCst) < count && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(received.load(Ordering::SeqCst), count, "message never arrived within the deadline");
}

#[test]
fn tcp_listener_dial_send_receive_shutdown() {
    let received = Arc::new(AtomicUsize::new(0));
    let protocol = Protocol::new(
        "full_stack_tcp",
        Arc::new(CountingHandler { received: received.clone() }),
        netloom_logging::discard(),
    );
    protocol.register_processor(TextProcessor);
    protocol.set_access_provider(Arc::new(AllowAllAccess));

    let id_alloc = netloom::shared_id_allocator();
    let server_lifecycle = Lifecycle::new();
    let client_lifecycle = Lifecycle::new();

    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (mut server, server_events) =
        TcpTransport::bind(addr, id_alloc.clone(), netloom_logging::discard(), server_lifecycle).expect("bind should succeed on an ephemeral port");
    let bound_addr = server.local_addr().expect("a bound listener reports its address");

    let (mut client, client_events) =
        TcpTransport::connect(bound_addr, id_alloc, netloom_logging::discard(), client_lifecycle).expect("dial should succeed against the bound listener");

    // The client side only sends; it never needs the pipeline, so only the server
    // side's events are attached to the protocol.
    let server_attach = protocol.attach(server_events.connect_rx, server_events.disconnect_rx, server_events.inbound_rx, Some(server_events.error_rx));

    let dialed_peer = client_events
        .connect_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("the dial should report its own peer on connect_rx");

    let text: Box<dyn Any + Send + Sync> = Box::new(String::from("hello over the wire"));
    protocol.register_connection(dialed_peer.clone());
    protocol.send(dialed_peer.id(), 1, text.as_ref(), 15).unwrap();

    wait_until(&received, 1);

    client.shutdown();
    server.shutdown();
    protocol.shutdown();
    let _ = server_attach.join();
}

#[test]
fn loopback_pair_send_receive_through_a_protocol() {
    let received = Arc::new(AtomicUsize::new(0));
    let protocol = Protocol::new(
        "full_stack_loopback",
        Arc::new(CountingHandler { received: received.clone() }),
        netloom_logging::discard(),
    );
    protocol.register_processor(TextProcessor);

    let ((client, _client_events), (server, server_events)) = loopback_pair(51, 52);
    protocol.register_connection(client.clone());
    protocol.register_connection(server.clone());

    let attach_handle = protocol.attach(
        crossbeam_channel::never::<Arc<netloom::LoopbackConnection>>(),
        crossbeam_channel::never::<ConnectionId>(),
        server_events.inbound_rx,
        None,
    );

    let text: Box<dyn Any + Send + Sync> = Box::new(String::from("hello over the wire"));
    protocol.send(client.id(), 1, text.as_ref(), 15).unwrap();

    wait_until(&received, 1);

    protocol.shutdown();
    let _ = attach_handle.join();
}
