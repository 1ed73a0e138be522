//! Mailbox module
//!
//! Keeps the number of queued envelopes per actor class and times each
//! envelope from its first enqueue to its dequeue. The correlation itself
//! lives in [`MailboxLatencyTracker`]; this module only feeds it and reports
//! what it hands back.

use super::{class_tags, ClassGauges, InstrumentationModule, ListenerSet};
use crate::events::{EnvelopeCopied, EnvelopeCreated, EnvelopeDequeued};
use crate::fanout::listener;
use crate::tracker::MailboxLatencyTracker;
use crate::{names, MetricsRegistry, Result};
use anyhow::Context;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mailbox sizes and time spent waiting in the mailbox
///
/// Three listeners are attached:
/// - enqueue/dequeue keep the per-class size gauge and feed the latency
///   tracker, recording `actor.mailbox.time` on dequeue
/// - copy propagates the original enqueue time to the new envelope
/// - a separate copy listener counts copies in `actor.mailbox.envelope.copies`
pub struct MailboxModule {
    listeners: ListenerSet,
    state: Arc<MailboxState>,
}

struct MailboxState {
    sizes: ClassGauges,
    tracker: ArcSwap<MailboxLatencyTracker>,
    copies: AtomicU64,
}

impl MailboxState {
    fn on_created(
        &self,
        registry: &MetricsRegistry,
        event: &EnvelopeCreated,
    ) -> anyhow::Result<()> {
        if !registry.is_tracked(MailboxModule::ID, &event.receiver) {
            return Ok(());
        }
        self.tracker.load().on_created(event.envelope, event.timestamp_ns);

        let actor_class = event.receiver.actor_class();
        let size = self.sizes.cell(actor_class);
        size.increment();
        size.ensure_registered(registry, names::MAILBOX_SIZE, || {
            class_tags(registry, actor_class)
        })
    }

    fn on_copied(&self, event: &EnvelopeCopied) -> anyhow::Result<()> {
        self.tracker.load().on_copied(event.original, event.copy);
        Ok(())
    }

    fn count_copy(&self, registry: &MetricsRegistry) -> anyhow::Result<()> {
        if !registry.is_module_enabled(MailboxModule::ID) {
            return Ok(());
        }
        self.copies.fetch_add(1, Ordering::Relaxed);
        registry
            .backend()
            .increment_counter(names::ENVELOPE_COPIES, registry.global_tags(), 1)
            .context("recording envelope copy")?;
        Ok(())
    }

    fn on_dequeued(
        &self,
        registry: &MetricsRegistry,
        event: &EnvelopeDequeued,
    ) -> anyhow::Result<()> {
        // Always reclaim the entry, even if the receiver is no longer tracked
        let elapsed = self.tracker.load().on_dequeued(event.envelope);

        if !registry.is_tracked(MailboxModule::ID, &event.receiver) {
            return Ok(());
        }
        let actor_class = event.receiver.actor_class();
        self.sizes.cell(actor_class).decrement();

        if let Some(elapsed) = elapsed {
            if registry.sample() {
                let tags = class_tags(registry, actor_class);
                registry
                    .backend()
                    .record_timer(names::MAILBOX_TIME, &tags, elapsed)
                    .context("recording mailbox time")?;
            }
        }
        Ok(())
    }

    fn clear(&self) {
        self.sizes.clear();
        self.tracker.load().clear();
        self.copies.store(0, Ordering::Relaxed);
    }
}

impl MailboxModule {
    pub const ID: &'static str = "mailbox";

    pub fn new() -> Self {
        Self {
            listeners: ListenerSet::default(),
            state: Arc::new(MailboxState {
                sizes: ClassGauges::default(),
                tracker: ArcSwap::from_pointee(MailboxLatencyTracker::default()),
                copies: AtomicU64::new(0),
            }),
        }
    }

    pub fn mailbox_size(&self, actor_class: &str) -> u64 {
        self.state.sizes.get(actor_class)
    }

    pub fn total_mailbox_size(&self) -> u64 {
        self.state.sizes.total()
    }

    /// Envelopes currently awaiting dequeue
    pub fn tracked_envelopes(&self) -> usize {
        self.state.tracker.load().len()
    }

    pub fn copy_count(&self) -> u64 {
        self.state.copies.load(Ordering::Relaxed)
    }

    /// Reclaim abandoned envelope entries now; returns how many were dropped
    pub fn sweep(&self) -> usize {
        self.state.tracker.load().sweep_expired()
    }
}

impl Default for MailboxModule {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentationModule for MailboxModule {
    fn module_id(&self) -> &str {
        Self::ID
    }

    fn init(&self, registry: &Arc<MetricsRegistry>) -> Result<()> {
        self.listeners.detach_all();
        let events = registry.events();

        // Tracker follows the registry's clock and reclamation policy
        self.state.tracker.store(Arc::new(MailboxLatencyTracker::new(
            registry.config().mailbox_tracking(),
            Arc::clone(registry.clock()),
        )));

        let weak = Arc::downgrade(registry);
        let state = Arc::clone(&self.state);
        self.listeners.attach(
            events.envelope_created(),
            listener(move |event: &EnvelopeCreated| match weak.upgrade() {
                Some(registry) => state.on_created(&registry, event),
                None => Ok(()),
            }),
        );

        let state = Arc::clone(&self.state);
        self.listeners.attach(
            events.envelope_copied(),
            listener(move |event: &EnvelopeCopied| state.on_copied(event)),
        );

        let weak = Arc::downgrade(registry);
        let state = Arc::clone(&self.state);
        self.listeners.attach(
            events.envelope_copied(),
            listener(move |_: &EnvelopeCopied| match weak.upgrade() {
                Some(registry) => state.count_copy(&registry),
                None => Ok(()),
            }),
        );

        let weak = Arc::downgrade(registry);
        let state = Arc::clone(&self.state);
        self.listeners.attach(
            events.envelope_dequeued(),
            listener(move |event: &EnvelopeDequeued| match weak.upgrade() {
                Some(registry) => state.on_dequeued(&registry, event),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::clock::{Clock, ManualClock};
    use crate::events::EnvelopeId;
    use crate::{ActorContext, FilterConfig, MetricsConfiguration, ModuleConfig, Tags};
    use std::time::Duration;

    struct Fixture {
        registry: Arc<MetricsRegistry>,
        backend: Arc<RecordingBackend>,
        clock: Arc<ManualClock>,
        module: Arc<MailboxModule>,
    }

    fn setup(config: MetricsConfiguration) -> Fixture {
        let backend = Arc::new(RecordingBackend::new());
        let clock = Arc::new(ManualClock::new(0));
        let registry = MetricsRegistry::builder(config)
            .backend(backend.clone())
            .clock(clock.clone() as Arc<dyn Clock>)
            .build()
            .unwrap();
        let module = Arc::new(MailboxModule::new());
        registry.register_module(module.clone()).unwrap();
        Fixture {
            registry,
            backend,
            clock,
            module,
        }
    }

    fn worker() -> ActorContext {
        ActorContext::new("sys://user/w", "Worker")
    }

    impl Fixture {
        fn send(&self, envelope: EnvelopeId) {
            self.registry.events().envelope_created().dispatch(&EnvelopeCreated {
                envelope,
                receiver: worker(),
                timestamp_ns: self.clock.now_ns(),
            });
        }

        fn receive(&self, envelope: EnvelopeId) {
            self.registry
                .events()
                .envelope_dequeued()
                .dispatch(&EnvelopeDequeued {
                    envelope,
                    receiver: worker(),
                });
        }
    }

    fn worker_tags() -> Tags {
        Tags::new().with(names::tags::ACTOR_CLASS, "Worker")
    }

    #[test]
    fn test_size_and_latency() {
        let f = setup(MetricsConfiguration::default());
        let a = EnvelopeId::next();
        let b = EnvelopeId::next();

        f.send(a);
        f.send(b);
        assert_eq!(f.module.mailbox_size("Worker"), 2);
        assert_eq!(f.backend.gauge(names::MAILBOX_SIZE, &worker_tags()), Some(2.0));

        f.clock.advance(Duration::from_millis(3));
        f.receive(a);
        f.receive(b);

        assert_eq!(f.module.mailbox_size("Worker"), 0);
        assert_eq!(f.module.tracked_envelopes(), 0);
        let timer = f.backend.timer(names::MAILBOX_TIME, &worker_tags()).unwrap();
        assert_eq!(timer.count, 2);
        assert_eq!(timer.max, Duration::from_millis(3));
    }

    #[test]
    fn test_copy_keeps_original_enqueue_time() {
        let f = setup(MetricsConfiguration::default());
        let original = EnvelopeId::next();
        let copy = EnvelopeId::next();

        f.send(original);
        f.clock.advance(Duration::from_millis(2));
        f.registry
            .events()
            .envelope_copied()
            .dispatch(&EnvelopeCopied { original, copy });
        f.clock.advance(Duration::from_millis(1));
        f.receive(copy);

        let timer = f.backend.timer(names::MAILBOX_TIME, &worker_tags()).unwrap();
        assert_eq!(timer.max, Duration::from_millis(3));
        assert_eq!(f.module.copy_count(), 1);
        assert_eq!(f.backend.counter_total(names::ENVELOPE_COPIES), 1);
    }

    #[test]
    fn test_unknown_dequeue_is_not_an_error() {
        let f = setup(MetricsConfiguration::default());
        f.receive(EnvelopeId::next());

        assert_eq!(f.registry.events().envelope_dequeued().failure_count(), 0);
        assert_eq!(f.module.mailbox_size("Worker"), 0);
        assert_eq!(f.backend.timer_count(names::MAILBOX_TIME), 0);
    }

    #[test]
    fn test_disabled_module_records_nothing() {
        let config = MetricsConfiguration::builder()
            .module(MailboxModule::ID, ModuleConfig::disabled())
            .build()
            .unwrap();
        let f = setup(config);
        let id = EnvelopeId::next();

        f.send(id);
        f.receive(id);
        f.registry.events().envelope_copied().dispatch(&EnvelopeCopied {
            original: id,
            copy: EnvelopeId::next(),
        });

        assert_eq!(f.module.total_mailbox_size(), 0);
        assert_eq!(f.module.copy_count(), 0);
        assert_eq!(f.backend.timer_count(names::MAILBOX_TIME), 0);
    }

    #[test]
    fn test_excluded_receiver_is_not_tracked() {
        let config = MetricsConfiguration::builder()
            .filters(FilterConfig::new().exclude_actor("sys://user/*"))
            .build()
            .unwrap();
        let f = setup(config);

        f.send(EnvelopeId::next());
        assert_eq!(f.module.tracked_envelopes(), 0);
        assert_eq!(f.module.mailbox_size("Worker"), 0);
    }

    #[test]
    fn test_sweep_reclaims_dropped_envelopes() {
        let f = setup(MetricsConfiguration::default());
        f.send(EnvelopeId::next());

        f.clock.advance(crate::config::DEFAULT_MAX_ENTRY_AGE + Duration::from_secs(1));
        assert_eq!(f.module.sweep(), 1);
        assert_eq!(f.module.tracked_envelopes(), 0);
    }
}
