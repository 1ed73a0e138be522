//! Monotonic clock source
//!
//! Enqueue and dequeue timestamps must come from one monotonic source so that
//! `dequeue - enqueue` is never negative in a correct lifecycle. The default
//! clock measures nanoseconds since a process-wide epoch captured lazily on
//! first use.

use once_cell::sync::Lazy;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds elapsed since the process epoch
#[inline]
pub fn monotonic_now_ns() -> u64 {
    PROCESS_EPOCH.elapsed().as_nanos() as u64
}

/// Source of monotonic nanosecond timestamps
pub trait Clock: Send + Sync + Debug {
    fn now_ns(&self) -> u64;
}

/// Process-wide monotonic clock backed by [`Instant`]
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        monotonic_now_ns()
    }
}

/// Manually driven clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ns.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}
