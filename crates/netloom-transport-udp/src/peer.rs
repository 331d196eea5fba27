//! A UDP endpoint bound to one peer address. Unlike the TCP peer, sends are issued
//! directly against the shared socket rather than queued for a reactor to flush: a
//! `sendto` either lands in the kernel's send buffer immediately or fails outright,
//! there is nothing to reassemble or retry.

use mio::net::UdpSocket;
use netloom_core::connection::{Connection, ConnectionId};
use netloom_core::error::{NetError, NetResult};
use netloom_wire::header::Header;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct UdpPeer {
    id: ConnectionId,
    local_addr: Option<SocketAddr>,
    remote_addr: SocketAddr,
    socket: Arc<UdpSocket>,
    closed: AtomicBool,
}

impl UdpPeer {
    pub(crate) fn new(id: ConnectionId, local_addr: Option<SocketAddr>, remote_addr: SocketAddr, socket: Arc<UdpSocket>) -> UdpPeer {
        UdpPeer {
            id,
            local_addr,
            remote_addr,
            socket,
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for UdpPeer {
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
        Some(self.remote_addr)
    }

    /// `timeout_secs` is accepted for trait conformance but unused: a UDP `sendto`
    /// either lands in the kernel buffer this call or fails, there is no pending state
    /// to time out later the way there is for a TCP write queue.
    fn send(&self, bytes: &[u8], _timeout_secs: u32) -> NetResult<()> {
        if self.is_closed() {
            return Err(NetError::SendInvalidCli(self.id));
        }

        let signature = Header::read(bytes).map(|h| h.signature()).unwrap_or(0);
        match self.socket.send_to(bytes, self.remote_addr) {
            Ok(n) if n == bytes.len() => Ok(()),
            Ok(_) => Err(NetError::TimeoutSend(signature)),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Err(NetError::TimeoutSend(signature)),
            Err(err) => Err(err.into()),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
