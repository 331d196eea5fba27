//! An in-process connection pair wired directly together through channels, bypassing
//! sockets entirely. Lets a `Protocol`-level test exercise the full receive/send
//! pipeline without binding a port.

use crate::connection::{Connection, ConnectionId};
use crate::error::{NetError, NetResult};
use netloom_wire::Message;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// One end of a loopback pair. `send` hands bytes straight to a background thread that
/// reassembles them into `Message`s and publishes completed ones on `inbound_rx`, the
/// same contract a real transport's reactor honors.
pub struct LoopbackConnection {
    id: ConnectionId,
    tx: crossbeam_channel::Sender<Vec<u8>>,
    closed: AtomicBool,
}

impl Connection for LoopbackConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn send(&self, bytes: &[u8], _timeout_secs: u32) -> NetResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetError::SendInvalidCli(self.id));
        }
        self.tx.send(bytes.to_vec()).map_err(|_| NetError::SendInvalidCli(self.id))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// The receive-side channels for one end of a loopback pair, shaped to match
/// `TcpEvents`/`UdpEvents` closely enough to feed `Protocol::attach` directly.
pub struct LoopbackEvents {
    pub inbound_rx: crossbeam_channel::Receiver<(ConnectionId, Message)>,
}

/// Builds two connections, `a` and `b`, such that bytes sent on one arrive, reassembled
/// into `Message`s, on the other's `LoopbackEvents::inbound_rx`.
pub fn loopback_pair(id_a: ConnectionId, id_b: ConnectionId) -> ((Arc<LoopbackConnection>, LoopbackEvents), (Arc<LoopbackConnection>, LoopbackEvents)) {
    let (a_to_b_tx, a_to_b_rx) = crossbeam_channel::unbounded::<Vec<u8>>();
    let (b_to_a_tx, b_to_a_rx) = crossbeam_channel::unbounded::<Vec<u8>>();

    let a = Arc::new(LoopbackConnection {
        id: id_a,
        tx: a_to_b_tx,
        closed: AtomicBool::new(false),
    });
    let b = Arc::new(LoopbackConnection {
        id: id_b,
        tx: b_to_a_tx,
        closed: AtomicBool::new(false),
    });

    let (b_inbound_tx, b_inbound_rx) = crossbeam_channel::unbounded();
    let (a_inbound_tx, a_inbound_rx) = crossbeam_channel::unbounded();

    spawn_assembler(id_b, a_to_b_rx, b_inbound_tx);
    spawn_assembler(id_a, b_to_a_rx, a_inbound_tx);

    (
        (a, LoopbackEvents { inbound_rx: a_inbound_rx }),
        (b, LoopbackEvents { inbound_rx: b_inbound_rx }),
    )
}

fn spawn_assembler(
    source_id: ConnectionId,
    rx: crossbeam_channel::Receiver<Vec<u8>>,
    inbound_tx: crossbeam_channel::Sender<(ConnectionId, Message)>,
) {
    thread::spawn(move || {
        let mut current = Message::new();
        while let Ok(chunk) = rx.recv() {
            let mut remaining: &[u8] = &chunk;
            while !remaining.is_empty() {
                let (leftover, complete) = current.add_data(remaining);
                if complete {
                    let finished = std::mem::replace(&mut current, Message::new());
                    if inbound_tx.send((source_id, finished)).is_err() {
                        return;
                    }
                }
                remaining = leftover;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_sent_on_one_end_arrive_assembled_on_the_other() {
        let ((a, _a_events), (b, b_events)) = loopback_pair(51, 52);

        let wire = Message::build(7, b"ping".to_vec()).unwrap();
        a.send(&wire.to_bytes(), 15).unwrap();

        let (from, message) = b_events.inbound_rx.recv_timeout(std::time::Duration::from_secs(1)).unwrap();
        assert_eq!(from, 51);
        assert!(message.is_valid());
        assert_eq!(message.payload(), b"ping");
        assert_eq!(b.id(), 52);
    }

    #[test]
    fn closing_one_end_rejects_further_sends() {
        let ((a, _), (_b, _)) = loopback_pair(51, 52);
        a.close();
        assert!(a.send(b"x", 15).is_err());
    }
}
