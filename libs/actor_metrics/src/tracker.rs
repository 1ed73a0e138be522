//! Mailbox latency tracking
//!
//! Correlates the enqueue of an envelope with its later dequeue. Entries are
//! keyed by [`EnvelopeId`], so two structurally identical messages are always
//! tracked separately. A copy re-keys the same logical message under a new id
//! while keeping the original enqueue timestamp.
//!
//! ## Reclamation
//!
//! Envelopes dropped before dequeue never produce a dequeue signal. Their
//! entries are reclaimed by an age-bounded sweep that runs every
//! `sweep_every` creations (and on demand via
//! [`sweep_expired`](MailboxLatencyTracker::sweep_expired)).

use crate::clock::{Clock, MonotonicClock};
use crate::config::MailboxTrackingConfig;
use crate::events::EnvelopeId;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

pub struct MailboxLatencyTracker {
    entries: DashMap<EnvelopeId, u64>,
    clock: Arc<dyn Clock>,
    max_age_ns: u64,
    sweep_every: u64,
    created: AtomicU64,
    sweeping: AtomicBool,
}

impl MailboxLatencyTracker {
    pub fn new(config: MailboxTrackingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            max_age_ns: u64::try_from(config.max_entry_age.as_nanos()).unwrap_or(u64::MAX),
            sweep_every: config.sweep_every,
            created: AtomicU64::new(0),
            sweeping: AtomicBool::new(false),
        }
    }

    /// Record the enqueue time of `id`; an existing entry is never overwritten
    pub fn on_created(&self, id: EnvelopeId, timestamp_ns: u64) {
        self.entries.entry(id).or_insert(timestamp_ns);
        self.maybe_sweep();
    }

    /// Carry the original enqueue time of `original` over to `copy`.
    ///
    /// Returns false when `original` is not tracked. The original entry is
    /// left in place and is reclaimed by its own dequeue or by the sweep.
    pub fn on_copied(&self, original: EnvelopeId, copy: EnvelopeId) -> bool {
        // Read and release the shard guard before touching another key
        let enqueued_at = match self.entries.get(&original) {
            Some(entry) => *entry.value(),
            None => return false,
        };
        self.entries.entry(copy).or_insert(enqueued_at);
        true
    }

    /// Remove `id` and return the time since its original enqueue.
    ///
    /// Removal is atomic: when two threads dequeue the same id only one of
    /// them receives the elapsed time.
    pub fn on_dequeued(&self, id: EnvelopeId) -> Option<Duration> {
        let (_, enqueued_at) = self.entries.remove(&id)?;
        let now = self.clock.now_ns();

        match now.checked_sub(enqueued_at) {
            Some(elapsed) => Some(Duration::from_nanos(elapsed)),
            None => {
                warn!(
                    envelope = %id,
                    enqueued_at,
                    now,
                    "Dequeue observed before enqueue, dropping latency sample"
                );
                None
            }
        }
    }

    /// Drop entries older than the configured maximum age; returns how many
    pub fn sweep_expired(&self) -> usize {
        let cutoff = self.clock.now_ns().saturating_sub(self.max_age_ns);
        let mut removed = 0;
        self.entries.retain(|_, enqueued_at| {
            let keep = *enqueued_at >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            trace!(removed, remaining = self.entries.len(), "Swept abandoned envelopes");
        }
        removed
    }

    fn maybe_sweep(&self) {
        if self.sweep_every == 0 {
            return;
        }
        let created = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        if created % self.sweep_every != 0 {
            return;
        }
        // One sweeper at a time; other threads keep going
        if self.sweeping.swap(true, Ordering::Acquire) {
            return;
        }
        self.sweep_expired();
        self.sweeping.store(false, Ordering::Release);
    }

    pub fn is_tracked(&self, id: EnvelopeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.created.store(0, Ordering::Relaxed);
    }
}

impl Default for MailboxLatencyTracker {
    fn default() -> Self {
        Self::new(MailboxTrackingConfig::default(), Arc::new(MonotonicClock))
    }
}

impl fmt::Debug for MailboxLatencyTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxLatencyTracker")
            .field("entries.len()", &self.entries.len())
            .field("max_age_ns", &self.max_age_ns)
            .field("sweep_every", &self.sweep_every)
            .finish()
    }
}
