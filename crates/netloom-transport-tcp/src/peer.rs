//! The [`Connection`] implementation handed to callers for an accepted or dialed TCP
//! socket. A peer never touches its own socket directly: it only queues outbound bytes
//! and wakes the owning reactor thread, which does the actual, non-blocking I/O. This
//! mirrors the single-poll-loop model the reactor is built around (see
//! [`crate::reactor`]) rather than a worker-thread-per-connection design.

use netloom_core::connection::{Connection, ConnectionId};
use netloom_core::error::{NetError, NetResult};
use netloom_wire::header::Header;
use netloom_wire::message::clamp_timeout;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One chunk of outbound bytes waiting to be flushed to the socket, with the deadline
/// by which it must be fully written before the reactor gives up and closes the peer.
pub(crate) struct QueuedWrite {
    pub data: Vec<u8>,
    pub offset: usize,
    pub deadline: Instant,
    /// The message signature carried by this write's header, for the `TimeoutSend` event
    /// raised if the deadline passes before the write completes. `0` if `data` is too
    /// short to hold a header (never true for writes built from `Message::to_bytes`).
    pub signature: u16,
}

pub struct TcpPeer {
    id: ConnectionId,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    pub(crate) outbox: Mutex<VecDeque<QueuedWrite>>,
    waker: Arc<mio::Waker>,
    closed: AtomicBool,
    pub(crate) close_requested: AtomicBool,
}

impl TcpPeer {
    pub(crate) fn new(
        id: ConnectionId,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
        waker: Arc<mio::Waker>,
    ) -> TcpPeer {
        TcpPeer {
            id,
            local_addr,
            remote_addr,
            outbox: Mutex::new(VecDeque::new()),
            waker,
            closed: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for TcpPeer {
    #[inline]
    fn id(&self) -> ConnectionId {
        self.id
    }

    #[inline]
    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    #[inline]
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn send(&self, bytes: &[u8], timeout_secs: u32) -> NetResult<()> {
        if self.is_closed() {
            return Err(NetError::SendInvalidCli(self.id));
        }

        let timeout = Duration::from_secs(clamp_timeout(timeout_secs) as u64);
        let signature = Header::read(bytes).map(|h| h.signature()).unwrap_or(0);
        self.outbox.lock().push_back(QueuedWrite {
            data: bytes.to_vec(),
            offset: 0,
            deadline: Instant::now() + timeout,
            signature,
        });
        let _ = self.waker.wake();
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.close_requested.store(true, Ordering::Release);
            let _ = self.waker.wake();
        }
    }
}
