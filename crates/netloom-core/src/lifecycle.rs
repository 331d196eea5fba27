//! Shared run/shutdown/heartbeat coordination used by every long-running worker in the
//! runtime: transport accept loops, read/write workers, the protocol event-dispatch
//! thread, and the perf-counter sampler. Workers are expected to structure themselves as
//!
//! ```ignore
//! while lifecycle.query_run() {
//!     select! {
//!         recv(lifecycle.heartbeat()) -> _ => { /* periodic work */ }
//!         recv(own_work_channel) -> msg => { /* handle msg */ }
//!         recv(lifecycle.shutdown_signal()) -> _ => break,
//!     }
//! }
//! lifecycle.shutdown_complete();
//! ```

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Heart {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// The coordination object. Cheap to clone: every field is reference-counted, so a
/// clone and the original observe the same run state, heartbeat, and shutdown signal.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

struct Inner {
    running: AtomicBool,
    shutdown_started: AtomicBool,
    heartbeat_tx: Sender<Instant>,
    heartbeat_rx: Receiver<Instant>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    complete_tx: Sender<()>,
    complete_rx: Receiver<()>,
    heart: Mutex<Option<Heart>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Lifecycle::new()
    }
}

impl Lifecycle {
    pub fn new() -> Lifecycle {
        let (heartbeat_tx, heartbeat_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let (complete_tx, complete_rx) = bounded(1);

        Lifecycle {
            inner: Arc::new(Inner {
                running: AtomicBool::new(true),
                shutdown_started: AtomicBool::new(false),
                heartbeat_tx,
                heartbeat_rx,
                shutdown_tx,
                shutdown_rx,
                complete_tx,
                complete_rx,
                heart: Mutex::new(None),
            }),
        }
    }

    #[inline]
    pub fn query_run(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Fires at `interval_ms` while the heart is running. A tick that arrives while no
    /// one is selecting on this receiver is dropped; the next interval fires normally.
    #[inline]
    pub fn heartbeat(&self) -> &Receiver<Instant> {
        &self.inner.heartbeat_rx
    }

    /// Fires exactly once, when shutdown begins.
    #[inline]
    pub fn shutdown_signal(&self) -> &Receiver<()> {
        &self.inner.shutdown_rx
    }

    /// Starts a background ticker posting to [`Lifecycle::heartbeat`] every
    /// `interval_ms`. An `interval_ms` of zero disables the heart. Idempotent: calling
    /// this while a heart is already running replaces it.
    pub fn start_heart(&self, interval_ms: u64) {
        self.stop_heart();
        if interval_ms == 0 {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_handle = stop.clone();
        let inner = self.inner.clone();

        let join = thread::spawn(move || {
            let period = Duration::from_millis(interval_ms);
            while !stop_handle.load(Ordering::Acquire) && inner.running.load(Ordering::Acquire) {
                thread::sleep(period);
                let _ = inner.heartbeat_tx.try_send(Instant::now());
            }
        });

        *self.inner.heart.lock() = Some(Heart { stop, join });
    }

    /// Stops the background ticker started by [`Lifecycle::start_heart`]. Idempotent.
    pub fn stop_heart(&self) {
        if let Some(heart) = self.inner.heart.lock().take() {
            heart.stop.store(true, Ordering::Release);
            let _ = heart.join.join();
        }
    }

    /// Begins shutdown and blocks until [`Lifecycle::shutdown_complete`] is called by
    /// the owning work loop. A second call is a no-op that returns immediately.
    pub fn shutdown(&self) {
        if self.inner.shutdown_started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.running.store(false, Ordering::Release);
        let _ = self.inner.shutdown_tx.send(());
        let _ = self.inner.complete_rx.recv();
        self.stop_heart();
    }

    /// Acknowledges that the owning work loop observed the shutdown signal and has
    /// drained. Unblocks any in-progress call to [`Lifecycle::shutdown`].
    pub fn shutdown_complete(&self) {
        let _ = self.inner.complete_tx.send(());
    }
}
