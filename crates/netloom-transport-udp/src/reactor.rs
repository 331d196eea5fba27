//! The UDP transport: a single shared socket, a poll loop that demultiplexes inbound
//! datagrams by source address into logical [`UdpPeer`] connections, and a one-datagram
//! one-message framing rule (no chunking, no reassembly).

use crate::peer::UdpPeer;
use hashbrown::HashMap;
use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use netloom_core::connection::{Connection, ConnectionId};
use netloom_core::{IdAllocator, Lifecycle};
use netloom_logging::Logger;
use netloom_wire::header::MAX_PAYLOAD;
use netloom_wire::Message;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const SOCKET_TOKEN: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

pub struct UdpEvents {
    pub connect_rx: crossbeam_channel::Receiver<Arc<UdpPeer>>,
    pub disconnect_rx: crossbeam_channel::Receiver<ConnectionId>,
    pub inbound_rx: crossbeam_channel::Receiver<(ConnectionId, Message)>,
}

struct Channels {
    connect_tx: crossbeam_channel::Sender<Arc<UdpPeer>>,
    #[allow(dead_code)]
    disconnect_tx: crossbeam_channel::Sender<ConnectionId>,
    inbound_tx: crossbeam_channel::Sender<(ConnectionId, Message)>,
}

pub struct UdpTransport {
    lifecycle: Lifecycle,
    join: Option<JoinHandle<()>>,
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Binds `addr` and demultiplexes every peer that sends to it by source address.
    pub fn bind(addr: SocketAddr, id_alloc: Arc<IdAllocator>, log: Logger, lifecycle: Lifecycle) -> io::Result<(UdpTransport, UdpEvents)> {
        let socket = UdpSocket::bind(addr)?;
        Self::spawn(socket, id_alloc, log, lifecycle)
    }

    /// Binds an ephemeral local socket and returns a single peer pinned to `remote`.
    pub fn connect(
        remote: SocketAddr,
        id_alloc: Arc<IdAllocator>,
        log: Logger,
        lifecycle: Lifecycle,
    ) -> io::Result<(UdpTransport, UdpEvents, Arc<UdpPeer>)> {
        let local: SocketAddr = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }.parse().unwrap();
        let socket = UdpSocket::bind(local)?;
        let (transport, events) = Self::spawn(socket, id_alloc.clone(), log, lifecycle)?;
        let peer = Arc::new(UdpPeer::new(
            id_alloc.next(),
            transport.socket.local_addr().ok(),
            remote,
            transport.socket.clone(),
        ));
        Ok((transport, events, peer))
    }

    fn spawn(mut socket: UdpSocket, id_alloc: Arc<IdAllocator>, log: Logger, lifecycle: Lifecycle) -> io::Result<(UdpTransport, UdpEvents)> {
        let poll = Poll::new()?;
        poll.registry().register(&mut socket, SOCKET_TOKEN, Interest::READABLE)?;
        let socket = Arc::new(socket);

        let (connect_tx, connect_rx) = crossbeam_channel::unbounded();
        let (disconnect_tx, disconnect_rx) = crossbeam_channel::unbounded();
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let channels = Channels {
            connect_tx,
            disconnect_tx,
            inbound_tx,
        };

        let worker_lifecycle = lifecycle.clone();
        let worker_socket = socket.clone();
        let join = thread::spawn(move || {
            run(poll, worker_socket, id_alloc, channels, worker_lifecycle, log);
        });

        Ok((
            UdpTransport {
                lifecycle,
                join: Some(join),
                socket,
            },
            UdpEvents {
                connect_rx,
                disconnect_rx,
                inbound_rx,
            },
        ))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown(&mut self) {
        self.lifecycle.shutdown();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.shutdown();
        }
    }
}

fn run(poll: Poll, socket: Arc<UdpSocket>, id_alloc: Arc<IdAllocator>, channels: Channels, lifecycle: Lifecycle, log: Logger) {
    let mut poll = poll;
    let mut events = Events::with_capacity(256);
    let mut peers: HashMap<SocketAddr, Arc<UdpPeer>> = HashMap::new();
    let mut scratch = vec![0u8; MAX_PAYLOAD + netloom_wire::header::HEADER_LEN];

    while lifecycle.query_run() {
        if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            if err.kind() != io::ErrorKind::Interrupted {
                netloom_logging::error!(log, "udp poll failed"; "error" => %err);
            }
            continue;
        }

        for event in events.iter() {
            if event.token() != SOCKET_TOKEN {
                continue;
            }

            loop {
                match socket.recv_from(&mut scratch) {
                    Ok((n, from)) => {
                        let peer = peers.entry(from).or_insert_with(|| {
                            let peer = Arc::new(UdpPeer::new(id_alloc.next(), socket.local_addr().ok(), from, socket.clone()));
                            netloom_logging::debug!(log, "udp peer observed"; "id" => peer.id(), "from" => %from);
                            let _ = channels.connect_tx.send(peer.clone());
                            peer
                        });

                        let mut message = Message::new();
                        let (_leftover, complete) = message.add_data(&scratch[..n]);
                        if complete {
                            let _ = channels.inbound_tx.send((peer.id(), message));
                        } else {
                            netloom_logging::debug!(log, "dropped malformed datagram"; "from" => %from, "len" => n);
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        netloom_logging::error!(log, "udp recv failed"; "error" => %err);
                        break;
                    }
                }
            }
        }
    }

    lifecycle.shutdown_complete();
}
