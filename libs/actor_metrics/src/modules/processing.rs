//! Message processing module
//!
//! Times each handled message and counts failures by error type.

use super::{class_tags, ClassGauges, InstrumentationModule, ListenerSet};
use crate::backend::TimerSnapshot;
use crate::context::UNKNOWN;
use crate::events::{ProcessEnter, ProcessExit};
use crate::fanout::listener;
use crate::{names, MetricsRegistry, Result};
use anyhow::Context;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Message handling time, failures and in-flight messages per actor class
///
/// Processing times are tagged with `actor_class` and `message_type` and are
/// also aggregated per message type in memory, readable via
/// [`stats`](Self::stats) until shutdown.
pub struct MessageProcessingModule {
    listeners: ListenerSet,
    state: Arc<ProcessingState>,
}

#[derive(Default)]
struct ProcessingState {
    inflight: ClassGauges,
    stats: DashMap<String, TimerSnapshot>,
}

impl ProcessingState {
    fn on_enter(&self, registry: &MetricsRegistry, event: &ProcessEnter) -> anyhow::Result<()> {
        if !registry.is_tracked(MessageProcessingModule::ID, &event.context) {
            return Ok(());
        }
        let actor_class = event.context.actor_class();
        let inflight = self.inflight.cell(actor_class);
        inflight.increment();
        inflight.ensure_registered(registry, names::MESSAGE_INFLIGHT, || {
            class_tags(registry, actor_class)
        })
    }

    fn on_exit(&self, registry: &MetricsRegistry, event: &ProcessExit) -> anyhow::Result<()> {
        let context = &event.context;
        if !registry.is_tracked(MessageProcessingModule::ID, context) {
            return Ok(());
        }
        self.inflight.cell(context.actor_class()).decrement();

        if !registry.is_message_tracked(MessageProcessingModule::ID, context) {
            return Ok(());
        }
        let message_type = context.message_type().unwrap_or(UNKNOWN);
        let tags = || {
            class_tags(registry, context.actor_class())
                .with(names::tags::MESSAGE_TYPE, message_type)
        };

        // Failures are counted regardless of sampling
        if let Some(error) = &event.error {
            registry
                .backend()
                .increment_counter(
                    names::MESSAGE_ERRORS,
                    &tags().with(names::tags::ERROR_TYPE, error.as_str()),
                    1,
                )
                .context("recording processing error")?;
        }

        if !registry.sample() {
            return Ok(());
        }
        let now = registry.now_ns();
        let Some(elapsed) = now.checked_sub(event.entered_at_ns) else {
            warn!(
                actor = %context,
                entered_at = event.entered_at_ns,
                now,
                "Process exit observed before enter, dropping sample"
            );
            return Ok(());
        };
        let elapsed = Duration::from_nanos(elapsed);

        self.stats
            .entry(message_type.to_string())
            .or_default()
            .record(elapsed);
        registry
            .backend()
            .record_timer(names::MESSAGE_PROCESSING, &tags(), elapsed)
            .context("recording processing time")?;
        Ok(())
    }

    fn clear(&self) {
        self.inflight.clear();
        self.stats.clear();
    }
}

impl MessageProcessingModule {
    pub const ID: &'static str = "processing";

    pub fn new() -> Self {
        Self {
            listeners: ListenerSet::default(),
            state: Arc::new(ProcessingState::default()),
        }
    }

    /// Running statistics for one message type
    pub fn stats(&self, message_type: &str) -> Option<TimerSnapshot> {
        self.state.stats.get(message_type).map(|s| *s)
    }

    /// Statistics for every message type seen, sorted by type
    pub fn all_stats(&self) -> Vec<(String, TimerSnapshot)> {
        let mut stats: Vec<(String, TimerSnapshot)> = self
            .state
            .stats
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub fn inflight(&self, actor_class: &str) -> u64 {
        self.state.inflight.get(actor_class)
    }

    /// Listeners this module currently has attached
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for MessageProcessingModule {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentationModule for MessageProcessingModule {
    fn module_id(&self) -> &str {
        Self::ID
    }

    fn init(&self, registry: &Arc<MetricsRegistry>) -> Result<()> {
        self.listeners.detach_all();
        let events = registry.events();

        let weak = Arc::downgrade(registry);
        let state = Arc::clone(&self.state);
        self.listeners.attach(
            events.process_enter(),
            listener(move |event: &ProcessEnter| match weak.upgrade() {
                Some(registry) => state.on_enter(&registry, event),
                None => Ok(()),
            }),
        );

        let weak = Arc::downgrade(registry);
        let state = Arc::clone(&self.state);
        self.listeners.attach(
            events.process_exit(),
            listener(move |event: &ProcessExit| match weak.upgrade() {
                Some(registry) => state.on_exit(&registry, event),
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
