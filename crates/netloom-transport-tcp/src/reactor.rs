//! The TCP transport: an accept loop, a connect path, and a single `mio`-driven poll
//! loop that reads, reassembles, and flushes every connection it owns. Each bound
//! listener or dialed connection runs its own reactor thread, coordinated by a
//! [`Lifecycle`].
//!
//! Every tick, pending outbound bytes are force-flushed for every live connection
//! regardless of which connections' write-readiness events actually fired; this avoids
//! having to reason about edge- vs level-triggered readiness for the write side and
//! keeps the per-connection write-timeout bookkeeping in one place.

use crate::peer::TcpPeer;
use hashbrown::HashMap;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use netloom_core::connection::{Connection, ConnectionId};
use netloom_core::error::NetError;
use netloom_core::{IdAllocator, Lifecycle};
use netloom_logging::Logger;
use netloom_wire::header::MAX_PAYLOAD;
use netloom_wire::Message;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
const FIRST_CONN_TOKEN: usize = 2;
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Events produced by a [`TcpTransport`], consumed by the protocol engine.
pub struct TcpEvents {
    pub connect_rx: crossbeam_channel::Receiver<Arc<TcpPeer>>,
    pub disconnect_rx: crossbeam_channel::Receiver<ConnectionId>,
    pub inbound_rx: crossbeam_channel::Receiver<(ConnectionId, Message)>,
    pub error_rx: crossbeam_channel::Receiver<(ConnectionId, NetError)>,
}

struct Channels {
    connect_tx: crossbeam_channel::Sender<Arc<TcpPeer>>,
    disconnect_tx: crossbeam_channel::Sender<ConnectionId>,
    inbound_tx: crossbeam_channel::Sender<(ConnectionId, Message)>,
    error_tx: crossbeam_channel::Sender<(ConnectionId, NetError)>,
}

struct Conn {
    stream: TcpStream,
    peer: Arc<TcpPeer>,
    current: Message,
}

/// A bound listener or a single dialed connection, driven by its own reactor thread.
pub struct TcpTransport {
    lifecycle: Lifecycle,
    join: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl TcpTransport {
    /// Binds `addr` and accepts connections onto it until shutdown.
    pub fn bind(
        addr: SocketAddr,
        id_alloc: Arc<IdAllocator>,
        log: Logger,
        lifecycle: Lifecycle,
    ) -> io::Result<(TcpTransport, TcpEvents)> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr().ok();
        Self::spawn(Some(listener), None, id_alloc, log, lifecycle, local_addr)
    }

    /// Dials `addr` and reports the resulting peer on `TcpEvents::connect_rx`.
    pub fn connect(
        addr: SocketAddr,
        id_alloc: Arc<IdAllocator>,
        log: Logger,
        lifecycle: Lifecycle,
    ) -> io::Result<(TcpTransport, TcpEvents)> {
        let stream = TcpStream::connect(addr)?;
        let local_addr = stream.local_addr().ok();
        Self::spawn(None, Some(stream), id_alloc, log, lifecycle, local_addr)
    }

    fn spawn(
        listener: Option<TcpListener>,
        dial: Option<TcpStream>,
        id_alloc: Arc<IdAllocator>,
        log: Logger,
        lifecycle: Lifecycle,
        local_addr: Option<SocketAddr>,
    ) -> io::Result<(TcpTransport, TcpEvents)> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        let mut listener = listener;
        if let Some(listener) = listener.as_mut() {
            poll.registry().register(listener, LISTENER_TOKEN, Interest::READABLE)?;
        }

        let (connect_tx, connect_rx) = crossbeam_channel::unbounded();
        let (disconnect_tx, disconnect_rx) = crossbeam_channel::unbounded();
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (error_tx, error_rx) = crossbeam_channel::unbounded();
        let channels = Channels {
            connect_tx,
            disconnect_tx,
            inbound_tx,
            error_tx,
        };

        let worker_lifecycle = lifecycle.clone();
        let join = thread::spawn(move || {
            run(poll, listener, dial, waker, id_alloc, channels, worker_lifecycle, log);
        });

        Ok((
            TcpTransport {
                lifecycle,
                join: Some(join),
                local_addr,
            },
            TcpEvents {
                connect_rx,
                disconnect_rx,
                inbound_rx,
                error_rx,
            },
        ))
    }

    /// The address this transport bound or dialed from, if the underlying socket call
    /// reported one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stops the reactor thread and waits for it to exit.
    pub fn shutdown(&mut self) {
        self.lifecycle.shutdown();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.shutdown();
        }
    }
}

fn run(
    mut poll: Poll,
    listener: Option<TcpListener>,
    dial: Option<TcpStream>,
    waker: Arc<Waker>,
    id_alloc: Arc<IdAllocator>,
    channels: Channels,
    lifecycle: Lifecycle,
    log: Logger,
) {
    let mut events = Events::with_capacity(1024);
    let mut conns: HashMap<Token, Conn> = HashMap::new();
    let mut next_token = FIRST_CONN_TOKEN;

    if let Some(stream) = dial {
        let token = Token(next_token);
        next_token += 1;
        if register_and_announce(&poll, token, stream, &id_alloc, &waker, &channels, &log, &mut conns).is_err() {
            return;
        }
    }

    while lifecycle.query_run() {
        if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            if err.kind() != io::ErrorKind::Interrupted {
                netloom_logging::error!(log, "poll failed"; "error" => %err);
            }
            continue;
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    if let Some(listener) = listener.as_ref() {
                        accept_loop(listener, &poll, &id_alloc, &waker, &channels, &log, &mut conns, &mut next_token);
                    }
                }
                WAKER_TOKEN => { /* only here to interrupt the poll wait */ }
                token => {
                    if conns.contains_key(&token) {
                        handle_readable(token, &poll, &channels, &log, &mut conns);
                    }
                }
            }
        }

        flush_outbound(&poll, &channels, &log, &mut conns);
    }

    for (_token, conn) in conns.drain() {
        let _ = conn.stream.shutdown(std::net::Shutdown::Both);
        conn.peer.mark_closed();
        let _ = channels.disconnect_tx.send(conn.peer.id());
    }

    lifecycle.shutdown_complete();
}

fn accept_loop(
    listener: &TcpListener,
    poll: &Poll,
    id_alloc: &Arc<IdAllocator>,
    waker: &Arc<Waker>,
    channels: &Channels,
    log: &Logger,
    conns: &mut HashMap<Token, Conn>,
    next_token: &mut usize,
) {
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let token = Token(*next_token);
                *next_token += 1;
                let _ = register_and_announce(poll, token, stream, id_alloc, waker, channels, log, conns);
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => {
                netloom_logging::error!(log, "accept failed"; "error" => %err);
                break;
            }
        }
    }
}

fn register_and_announce(
    poll: &Poll,
    token: Token,
    mut stream: TcpStream,
    id_alloc: &Arc<IdAllocator>,
    waker: &Arc<Waker>,
    channels: &Channels,
    log: &Logger,
    conns: &mut HashMap<Token, Conn>,
) -> io::Result<()> {
    poll.registry().register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)?;

    let local_addr = stream.local_addr().ok();
    let remote_addr = stream.peer_addr().ok();
    let id = id_alloc.next();
    let peer = Arc::new(TcpPeer::new(id, local_addr, remote_addr, waker.clone()));

    netloom_logging::debug!(log, "connection established"; "id" => id, "remote" => ?remote_addr);
    conns.insert(
        token,
        Conn {
            stream,
            peer: peer.clone(),
            current: Message::new(),
        },
    );
    let _ = channels.connect_tx.send(peer);
    Ok(())
}

fn handle_readable(token: Token, poll: &Poll, channels: &Channels, log: &Logger, conns: &mut HashMap<Token, Conn>) {
    let mut scratch = [0u8; MAX_PAYLOAD + netloom_wire::header::HEADER_LEN];
    let mut disconnect = false;

    if let Some(conn) = conns.get_mut(&token) {
        loop {
            match conn.stream.read(&mut scratch) {
                Ok(0) => {
                    disconnect = true;
                    break;
                }
                Ok(n) => {
                    let mut remaining = &scratch[..n];
                    while !remaining.is_empty() {
                        let (leftover, complete) = conn.current.add_data(remaining);
                        if complete {
                            let finished = std::mem::replace(&mut conn.current, Message::new());
                            if finished.is_valid() {
                                let _ = channels.inbound_tx.send((conn.peer.id(), finished));
                            } else {
                                let _ = channels.error_tx.send((conn.peer.id(), NetError::RcvChecksum));
                            }
                        }
                        remaining = leftover;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_err) => {
                    disconnect = true;
                    break;
                }
            }
        }
    }

    if disconnect {
        close_connection(token, poll, channels, log, conns);
    }
}

fn flush_outbound(poll: &Poll, channels: &Channels, log: &Logger, conns: &mut HashMap<Token, Conn>) {
    let tokens: Vec<Token> = conns.keys().copied().collect();
    let mut to_close = Vec::new();

    for token in tokens {
        let conn = match conns.get_mut(&token) {
            Some(conn) => conn,
            None => continue,
        };

        if conn.peer.close_requested.load(Ordering::Acquire) {
            to_close.push(token);
            continue;
        }

        let mut outbox = conn.peer.outbox.lock();
        let mut timed_out = false;
        let mut timed_out_signature = 0u16;
        let mut hard_error = false;

        loop {
            enum Step {
                Done,
                FullyWritten,
                Blocked,
                TimedOut,
                HardError,
            }

            let step = match outbox.front_mut() {
                None => Step::Done,
                Some(front) => match conn.stream.write(&front.data[front.offset..]) {
                    Ok(0) => Step::Blocked,
                    Ok(n) => {
                        front.offset += n;
                        if front.offset == front.data.len() {
                            Step::FullyWritten
                        } else {
                            Step::Blocked
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        if Instant::now() > front.deadline {
                            timed_out_signature = front.signature;
                            Step::TimedOut
                        } else {
                            Step::Blocked
                        }
                    }
                    Err(_err) => Step::HardError,
                },
            };

            match step {
                Step::Done | Step::Blocked => break,
                Step::FullyWritten => {
                    outbox.pop_front();
                }
                Step::TimedOut => {
                    timed_out = true;
                    break;
                }
                Step::HardError => {
                    hard_error = true;
                    break;
                }
            }
        }

        if hard_error {
            to_close.push(token);
        }

        if timed_out {
            let _ = channels.error_tx.send((conn.peer.id(), NetError::TimeoutSend(timed_out_signature)));
            to_close.push(token);
        }
    }

    for token in to_close {
        close_connection(token, poll, channels, log, conns);
    }
}

fn close_connection(token: Token, poll: &Poll, channels: &Channels, log: &Logger, conns: &mut HashMap<Token, Conn>) {
    if let Some(mut conn) = conns.remove(&token) {
        let _ = poll.registry().deregister(&mut conn.stream);
        let _ = conn.stream.shutdown(std::net::Shutdown::Both);
        conn.peer.mark_closed();
        netloom_logging::debug!(log, "connection closed"; "id" => conn.peer.id());
        let _ = channels.disconnect_tx.send(conn.peer.id());
    }
}
