//! Event fan-out registries
//!
//! One [`FanOut`] per event kind decouples how events arrive from what
//! consumes them. The listener list is copy-on-write: registration swaps in a
//! new list atomically while concurrent dispatches keep iterating over the
//! snapshot they loaded, so steady-state dispatch never takes a lock.
//!
//! A listener that returns an error or panics is isolated: the failure is
//! logged and delivery continues with the remaining listeners.

use crate::events::{
    ActorCreated, ActorTerminated, EnvelopeCopied, EnvelopeCreated, EnvelopeDequeued,
    ProcessEnter, ProcessExit,
};
use arc_swap::ArcSwap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Consumer of one event kind
pub trait EventListener<E>: Send + Sync {
    fn on_event(&self, event: &E) -> anyhow::Result<()>;
}

impl<E, F> EventListener<E> for F
where
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &E) -> anyhow::Result<()> {
        self(event)
    }
}

/// Shared listener reference; identity is the allocation
pub type ListenerRef<E> = Arc<dyn EventListener<E>>;

/// Box a closure as a listener
pub fn listener<E, F>(f: F) -> ListenerRef<E>
where
    E: 'static,
    F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_listener<E: ?Sized>(a: &Arc<E>, b: &Arc<E>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Listener registry for one event kind
pub struct FanOut<E> {
    kind: &'static str,
    listeners: ArcSwap<Vec<ListenerRef<E>>>,
    failures: AtomicU64,
}

impl<E: 'static> FanOut<E> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            listeners: ArcSwap::from_pointee(Vec::new()),
            failures: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn register(&self, listener: ListenerRef<E>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Remove `listener`; returns whether it was registered
    pub fn unregister(&self, listener: &ListenerRef<E>) -> bool {
        let mut removed = false;
        self.listeners.rcu(|current| {
            let next: Vec<ListenerRef<E>> = current
                .iter()
                .filter(|l| !same_listener(*l, listener))
                .cloned()
                .collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    /// Deliver `event` to every listener; returns the number that failed
    pub fn dispatch(&self, event: &E) -> usize {
        let listeners = self.listeners.load();
        let mut failed = 0;

        for listener in listeners.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failed += 1;
                    debug!(kind = self.kind, error = %e, "Event listener failed");
                }
                Err(_) => {
                    failed += 1;
                    warn!(kind = self.kind, "Event listener panicked");
                }
            }
        }

        if failed > 0 {
            self.failures.fetch_add(failed as u64, Ordering::Relaxed);
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total listener failures observed since creation or the last reset
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Drop every listener. Intended for test teardown.
    pub fn reset(&self) {
        self.listeners.store(Arc::new(Vec::new()));
        self.failures.store(0, Ordering::Relaxed);
    }
}

impl<E> fmt::Debug for FanOut<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOut")
            .field("kind", &self.kind)
            .field("listeners.len()", &self.listeners.load().len())
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .finish()
    }
}

/// The full set of fan-out registries, one per event kind
#[derive(Debug)]
pub struct EventHub {
    actor_created: Arc<FanOut<ActorCreated>>,
    actor_terminated: Arc<FanOut<ActorTerminated>>,
    envelope_created: Arc<FanOut<EnvelopeCreated>>,
    envelope_copied: Arc<FanOut<EnvelopeCopied>>,
    envelope_dequeued: Arc<FanOut<EnvelopeDequeued>>,
    process_enter: Arc<FanOut<ProcessEnter>>,
    process_exit: Arc<FanOut<ProcessExit>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            actor_created: Arc::new(FanOut::new("actor_created")),
            actor_terminated: Arc::new(FanOut::new("actor_terminated")),
            envelope_created: Arc::new(FanOut::new("envelope_created")),
            envelope_copied: Arc::new(FanOut::new("envelope_copied")),
            envelope_dequeued: Arc::new(FanOut::new("envelope_dequeued")),
            process_enter: Arc::new(FanOut::new("process_enter")),
            process_exit: Arc::new(FanOut::new("process_exit")),
        }
    }

    pub fn actor_created(&self) -> &Arc<FanOut<ActorCreated>> {
        &self.actor_created
    }

    pub fn actor_terminated(&self) -> &Arc<FanOut<ActorTerminated>> {
        &self.actor_terminated
    }

    pub fn envelope_created(&self) -> &Arc<FanOut<EnvelopeCreated>> {
        &self.envelope_created
    }

    pub fn envelope_copied(&self) -> &Arc<FanOut<EnvelopeCopied>> {
        &self.envelope_copied
    }

    pub fn envelope_dequeued(&self) -> &Arc<FanOut<EnvelopeDequeued>> {
        &self.envelope_dequeued
    }

    pub fn process_enter(&self) -> &Arc<FanOut<ProcessEnter>> {
        &self.process_enter
    }

    pub fn process_exit(&self) -> &Arc<FanOut<ProcessExit>> {
        &self.process_exit
    }

    /// Listeners across every event kind
    pub fn listener_count(&self) -> usize {
        self.actor_created.len()
            + self.actor_terminated.len()
            + self.envelope_created.len()
            + self.envelope_copied.len()
            + self.envelope_dequeued.len()
            + self.process_enter.len()
            + self.process_exit.len()
    }

    pub fn reset(&self) {
        self.actor_created.reset();
        self.actor_terminated.reset();
        self.envelope_created.reset();
        self.envelope_copied.reset();
        self.envelope_dequeued.reset();
        self.process_enter.reset();
        self.process_exit.reset();
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
