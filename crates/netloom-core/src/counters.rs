//! Named sets of atomic counters with a per-second rate, sampled once a second by a
//! background thread (or, when an owning [`Lifecycle`](crate::Lifecycle) is supplied,
//! driven off its heartbeat instead of spawning one of its own).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A point-in-time snapshot of one counter: the raw value, the rate observed over the
/// last one-second sampling window, and the highest rate ever observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    pub value: u64,
    pub per_sec: u64,
    pub max_per_sec: u64,
}

struct Slot {
    value: AtomicU64,
    last_value: AtomicU64,
    per_sec: AtomicU64,
    max_per_sec: AtomicU64,
}

impl Slot {
    fn new() -> Slot {
        Slot {
            value: AtomicU64::new(0),
            last_value: AtomicU64::new(0),
            per_sec: AtomicU64::new(0),
            max_per_sec: AtomicU64::new(0),
        }
    }
}

struct Shared {
    name: String,
    names: Vec<String>,
    slots: Vec<Slot>,
}

/// A named collection of counters, addressable by index and by name.
#[derive(Clone)]
pub struct CounterSet {
    shared: Arc<Shared>,
}

impl CounterSet {
    pub fn new(name: impl Into<String>, counter_names: &[&str]) -> CounterSet {
        let slots = counter_names.iter().map(|_| Slot::new()).collect();
        CounterSet {
            shared: Arc::new(Shared {
                name: name.into(),
                names: counter_names.iter().map(|s| s.to_string()).collect(),
                slots,
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Resolves a counter's index by name, or `None` if it isn't part of this set.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.shared.names.iter().position(|n| n == name)
    }

    #[inline]
    pub fn increment(&self, index: usize) {
        self.shared.slots[index].value.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(&self, index: usize, amount: u64) {
        self.shared.slots[index].value.fetch_add(amount, Ordering::Relaxed);
    }

    #[inline]
    pub fn set(&self, index: usize, value: u64) {
        self.shared.slots[index].value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self, index: usize) -> CounterSnapshot {
        let slot = &self.shared.slots[index];
        CounterSnapshot {
            value: slot.value.load(Ordering::Relaxed),
            per_sec: slot.per_sec.load(Ordering::Relaxed),
            max_per_sec: slot.max_per_sec.load(Ordering::Relaxed),
        }
    }

    /// Recomputes every slot's rate from the delta since the last call. Called once a
    /// second by [`CounterSet::spawn_sampler`], or manually by a caller that drives its
    /// own sampling cadence (e.g. off a shared `Lifecycle` heartbeat).
    pub fn sample(&self) {
        for slot in &self.shared.slots {
            let current = slot.value.load(Ordering::Relaxed);
            let previous = slot.last_value.swap(current, Ordering::Relaxed);
            let delta = current.saturating_sub(previous);
            slot.per_sec.store(delta, Ordering::Relaxed);
            slot.max_per_sec.fetch_max(delta, Ordering::Relaxed);
        }
    }

    /// Spawns a detached thread that calls [`CounterSet::sample`] once a second until
    /// `run` stops returning true. Most callers instead drive `sample` from a shared
    /// `Lifecycle` heartbeat set to a one-second interval and never call this.
    pub fn spawn_sampler(&self, run: impl Fn() -> bool + Send + 'static) {
        let set = self.clone();
        thread::spawn(move || {
            while run() {
                thread::sleep(Duration::from_secs(1));
                set.sample();
            }
        });
    }
}
