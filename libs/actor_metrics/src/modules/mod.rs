//! Instrumentation modules
//!
//! Each module covers one concern and attaches its own listeners to the
//! registry's fan-out points during [`InstrumentationModule::init`]. Listeners
//! hold only a weak reference to the registry, so a dropped registry silently
//! turns them into no-ops.
//!
//! Module state is updated before anything is sent to the backend. A backend
//! failure therefore costs one data point and never skews a count.

mod lifecycle;
mod mailbox;
mod processing;

pub use lifecycle::LifecycleModule;
pub use mailbox::MailboxModule;
pub use processing::MessageProcessingModule;

use crate::backend::{GaugeFn, GaugeSink};
use crate::fanout::{FanOut, ListenerRef};
use crate::{names, MetricsRegistry, Result, Tags};
use anyhow::Context;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub trait InstrumentationModule: Send + Sync {
    fn module_id(&self) -> &str;

    /// Attach listeners and prepare state. Called once per registration.
    fn init(&self, registry: &Arc<MetricsRegistry>) -> Result<()>;

    /// Detach listeners and clear state; safe to call repeatedly
    fn shutdown(&self);
}

/// The modules shipped with the crate, registered together
#[derive(Clone)]
pub struct DefaultModules {
    pub lifecycle: Arc<LifecycleModule>,
    pub mailbox: Arc<MailboxModule>,
    pub processing: Arc<MessageProcessingModule>,
}

impl DefaultModules {
    pub fn install(registry: &Arc<MetricsRegistry>) -> Result<Self> {
        let modules = Self {
            lifecycle: Arc::new(LifecycleModule::new()),
            mailbox: Arc::new(MailboxModule::new()),
            processing: Arc::new(MessageProcessingModule::new()),
        };
        registry.register_module(modules.lifecycle.clone())?;
        registry.register_module(modules.mailbox.clone())?;
        registry.register_module(modules.processing.clone())?;
        Ok(modules)
    }
}

type Detach = Box<dyn FnOnce() + Send>;

/// Listeners a module attached, so they can be detached on shutdown
#[derive(Default)]
pub(crate) struct ListenerSet {
    detach: Mutex<Vec<Detach>>,
}

impl ListenerSet {
    pub(crate) fn attach<E: 'static>(&self, fanout: &Arc<FanOut<E>>, listener: ListenerRef<E>) {
        fanout.register(Arc::clone(&listener));
        let fanout = Arc::clone(fanout);
        self.detach.lock().push(Box::new(move || {
            fanout.unregister(&listener);
        }));
    }

    /// Detach everything; returns how many listeners were removed
    pub(crate) fn detach_all(&self) -> usize {
        let detach = std::mem::take(&mut *self.detach.lock());
        let count = detach.len();
        for f in detach {
            f();
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.detach.lock().len()
    }
}

/// A non-negative per-key count exposed as a gauge
///
/// Pull-style backends read the supplier registered by
/// [`ensure_registered`](Self::ensure_registered). Push-style backends hand
/// back a sink at registration, and every later change is written to it.
#[derive(Default)]
pub(crate) struct GaugeCell {
    value: Arc<AtomicU64>,
    registered: AtomicBool,
    sink: OnceCell<GaugeSink>,
}

impl GaugeCell {
    pub(crate) fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
        self.publish();
    }

    /// Decrement, saturating at zero
    pub(crate) fn decrement(&self) {
        let changed = self
            .value
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1))
            .is_ok();
        if changed {
            self.publish();
        }
    }

    pub(crate) fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn publish(&self) {
        if let Some(sink) = self.sink.get() {
            sink(self.get() as f64);
        }
    }

    /// Register the gauge with the backend once; retried after a failure.
    /// `tags` is only evaluated when a registration is actually attempted.
    pub(crate) fn ensure_registered(
        &self,
        registry: &MetricsRegistry,
        name: &'static str,
        tags: impl FnOnce() -> Tags,
    ) -> anyhow::Result<()> {
        if self.registered.load(Ordering::Acquire) || self.registered.swap(true, Ordering::AcqRel)
        {
            return Ok(());
        }
        let tags = tags();
        let value = Arc::clone(&self.value);
        let supplier: GaugeFn = Arc::new(move || value.load(Ordering::Relaxed) as f64);
        let backend = registry.backend();
        backend
            .register_gauge(name, &tags, supplier)
            .map_err(|e| {
                self.registered.store(false, Ordering::Release);
                e
            })
            .with_context(|| format!("registering gauge {}", name))?;

        if let Some(sink) = backend.gauge_sink(name, &tags) {
            if self.sink.set(sink).is_ok() {
                self.publish();
            }
        }
        Ok(())
    }
}

/// Per actor class gauges
#[derive(Default)]
pub(crate) struct ClassGauges {
    cells: DashMap<String, Arc<GaugeCell>>,
}

impl ClassGauges {
    pub(crate) fn cell(&self, actor_class: &str) -> Arc<GaugeCell> {
        if let Some(cell) = self.cells.get(actor_class) {
            return Arc::clone(cell.value());
        }
        Arc::clone(self.cells.entry(actor_class.to_string()).or_default().value())
    }

    pub(crate) fn get(&self, actor_class: &str) -> u64 {
        self.cells.get(actor_class).map_or(0, |cell| cell.get())
    }

    pub(crate) fn total(&self) -> u64 {
        self.cells.iter().map(|cell| cell.get()).sum()
    }

    pub(crate) fn clear(&self) {
        self.cells.clear();
    }
}

pub(crate) fn class_tags(registry: &MetricsRegistry, actor_class: &str) -> Tags {
    registry.tags_for(&Tags::new().with(names::tags::ACTOR_CLASS, actor_class))
}
