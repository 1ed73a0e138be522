//! Actor lifecycle module
//!
//! Counts creations and terminations and keeps the live actor gauge per
//! actor class.

use super::{class_tags, ClassGauges, InstrumentationModule, ListenerSet};
use crate::events::{ActorCreated, ActorTerminated};
use crate::fanout::listener;
use crate::{names, ActorContext, MetricsRegistry, Result};
use anyhow::Context;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Actor creation, termination and the number of live actors per class
///
/// Local counts are exact for every tracked actor. The backend counters are
/// subject to sampling; the active gauge is not.
pub struct LifecycleModule {
    listeners: ListenerSet,
    state: Arc<LifecycleState>,
}

#[derive(Default)]
struct ClassCounts {
    created: AtomicU64,
    terminated: AtomicU64,
}

#[derive(Default)]
struct LifecycleState {
    counts: DashMap<String, Arc<ClassCounts>>,
    active: ClassGauges,
}

impl LifecycleState {
    fn counts(&self, actor_class: &str) -> Arc<ClassCounts> {
        if let Some(counts) = self.counts.get(actor_class) {
            return Arc::clone(counts.value());
        }
        Arc::clone(self.counts.entry(actor_class.to_string()).or_default().value())
    }

    fn on_created(&self, registry: &MetricsRegistry, context: &ActorContext) -> anyhow::Result<()> {
        if !registry.is_tracked(LifecycleModule::ID, context) {
            return Ok(());
        }
        let actor_class = context.actor_class();
        self.counts(actor_class).created.fetch_add(1, Ordering::Relaxed);
        let active = self.active.cell(actor_class);
        active.increment();

        active.ensure_registered(registry, names::ACTOR_ACTIVE, || {
            class_tags(registry, actor_class)
        })?;
        if registry.sample() {
            let tags = class_tags(registry, actor_class);
            registry
                .backend()
                .increment_counter(names::ACTOR_CREATED, &tags, 1)
                .context("recording actor creation")?;
        }
        Ok(())
    }

    fn on_terminated(
        &self,
        registry: &MetricsRegistry,
        context: &ActorContext,
    ) -> anyhow::Result<()> {
        if !registry.is_tracked(LifecycleModule::ID, context) {
            return Ok(());
        }
        let actor_class = context.actor_class();
        self.counts(actor_class)
            .terminated
            .fetch_add(1, Ordering::Relaxed);
        self.active.cell(actor_class).decrement();

        if registry.sample() {
            let tags = class_tags(registry, actor_class);
            registry
                .backend()
                .increment_counter(names::ACTOR_TERMINATED, &tags, 1)
                .context("recording actor termination")?;
        }
        Ok(())
    }

    fn clear(&self) {
        self.counts.clear();
        self.active.clear();
    }
}

impl LifecycleModule {
    pub const ID: &'static str = "lifecycle";

    pub fn new() -> Self {
        Self {
            listeners: ListenerSet::default(),
            state: Arc::new(LifecycleState::default()),
        }
    }

    pub fn created_count(&self, actor_class: &str) -> u64 {
        self.state
            .counts
            .get(actor_class)
            .map_or(0, |c| c.created.load(Ordering::Relaxed))
    }

    pub fn terminated_count(&self, actor_class: &str) -> u64 {
        self.state
            .counts
            .get(actor_class)
            .map_or(0, |c| c.terminated.load(Ordering::Relaxed))
    }

    pub fn active_count(&self, actor_class: &str) -> u64 {
        self.state.active.get(actor_class)
    }

    pub fn total_created(&self) -> u64 {
        self.state
            .counts
            .iter()
            .map(|c| c.created.load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_terminated(&self) -> u64 {
        self.state
            .counts
            .iter()
            .map(|c| c.terminated.load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_active(&self) -> u64 {
        self.state.active.total()
    }
}

impl Default for LifecycleModule {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentationModule for LifecycleModule {
    fn module_id(&self) -> &str {
        Self::ID
    }

    fn init(&self, registry: &Arc<MetricsRegistry>) -> Result<()> {
        self.listeners.detach_all();
        let events = registry.events();

        let weak = Arc::downgrade(registry);
        let state = Arc::clone(&self.state);
        self.listeners.attach(
            events.actor_created(),
            listener(move |event: &ActorCreated| match weak.upgrade() {
                Some(registry) => state.on_created(&registry, &event.context),
                None => Ok(()),
            }),
        );

        let weak = Arc::downgrade(registry);
        let state = Arc::clone(&self.state);
        self.listeners.attach(
            events.actor_terminated(),
            listener(move |event: &ActorTerminated| match weak.upgrade() {
                Some(registry) => state.on_terminated(&registry, &event.context),
                None => Ok(()),
            }),
        );
        Ok(())
    }

    fn shutdown(&self) {
        self.listeners.detach_all();
        self.state.clear();
    }
}
