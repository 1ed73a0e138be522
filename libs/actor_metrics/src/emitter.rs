//! Host-facing event entry points
//!
//! [`EventEmitter`] is what a host runtime's hook points call. It resolves
//! native handles into [`ActorContext`]s through the host's
//! [`ContextResolver`] and dispatches the resulting events through the current
//! registry's [`EventHub`](crate::EventHub).
//!
//! Every entry point returns without doing any work while the handle is unset
//! or the registry is disabled, and none of them can fail or panic into the
//! caller.

use crate::clock::monotonic_now_ns;
use crate::context::resolve_or_unknown;
use crate::events::{
    ActorCreated, ActorTerminated, EnvelopeCopied, EnvelopeCreated, EnvelopeDequeued, EnvelopeId,
    ProcessEnter, ProcessExit,
};
use crate::{ActorContext, ContextResolver, MetricsRegistry, RegistryHandle};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct EventEmitter<R> {
    resolver: R,
    handle: RegistryHandle,
}

impl<R: ContextResolver> EventEmitter<R> {
    pub fn new(resolver: R, handle: RegistryHandle) -> Self {
        Self { resolver, handle }
    }

    /// Emitter bound to [`RegistryHandle::global`]
    pub fn global(resolver: R) -> Self {
        Self::new(resolver, RegistryHandle::global())
    }

    pub fn handle(&self) -> &RegistryHandle {
        &self.handle
    }

    #[inline]
    fn active_registry(&self) -> Option<Arc<MetricsRegistry>> {
        self.handle.current().filter(|registry| registry.is_enabled())
    }

    fn context(&self, actor: &R::Handle, message_type: Option<&str>) -> ActorContext {
        let context = resolve_or_unknown(&self.resolver, actor);
        match message_type {
            Some(message_type) => context.with_message_type(message_type),
            None => context,
        }
    }

    /// Timestamp from the current registry's clock
    pub fn now_ns(&self) -> u64 {
        match self.handle.current() {
            Some(registry) => registry.now_ns(),
            None => monotonic_now_ns(),
        }
    }

    pub fn actor_created(&self, actor: &R::Handle) {
        let Some(registry) = self.active_registry() else {
            return;
        };
        let event = ActorCreated {
            context: self.context(actor, None),
        };
        registry.events().actor_created().dispatch(&event);
    }

    pub fn actor_terminated(&self, actor: &R::Handle) {
        let Some(registry) = self.active_registry() else {
            return;
        };
        let event = ActorTerminated {
            context: self.context(actor, None),
        };
        registry.events().actor_terminated().dispatch(&event);
    }

    /// A message for `receiver` was wrapped into `envelope` at `timestamp_ns`
    pub fn envelope_created(&self, receiver: &R::Handle, envelope: EnvelopeId, timestamp_ns: u64) {
        let Some(registry) = self.active_registry() else {
            return;
        };
        let event = EnvelopeCreated {
            envelope,
            receiver: self.context(receiver, None),
            timestamp_ns,
        };
        registry.events().envelope_created().dispatch(&event);
    }

    pub fn envelope_copied(&self, original: EnvelopeId, copy: EnvelopeId) {
        let Some(registry) = self.active_registry() else {
            return;
        };
        registry
            .events()
            .envelope_copied()
            .dispatch(&EnvelopeCopied { original, copy });
    }

    pub fn envelope_dequeued(&self, receiver: &R::Handle, envelope: EnvelopeId) {
        let Some(registry) = self.active_registry() else {
            return;
        };
        let event = EnvelopeDequeued {
            envelope,
            receiver: self.context(receiver, None),
        };
        registry.events().envelope_dequeued().dispatch(&event);
    }

    /// Message handling started.
    ///
    /// Returns the enter timestamp to hand back to
    /// [`process_exit`](Self::process_exit), or `None` when nothing was
    /// dispatched; in that case the exit should be skipped as well.
    pub fn process_enter(&self, actor: &R::Handle, message_type: Option<&str>) -> Option<u64> {
        let registry = self.active_registry()?;
        let entered_at_ns = registry.now_ns();
        let event = ProcessEnter {
            context: self.context(actor, message_type),
        };
        registry.events().process_enter().dispatch(&event);
        Some(entered_at_ns)
    }

    pub fn process_exit(
        &self,
        actor: &R::Handle,
        message_type: Option<&str>,
        entered_at_ns: u64,
        error: Option<&str>,
    ) {
        let Some(registry) = self.active_registry() else {
            return;
        };
        let event = ProcessExit {
            context: self.context(actor, message_type),
            entered_at_ns,
            error: error.map(str::to_string),
        };
        registry.events().process_exit().dispatch(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::fanout::listener;
    use crate::test_utils::{TestActorRef, TestResolver};
    use crate::MetricsConfiguration;
    use parking_lot::Mutex;

    fn registry(enabled: bool) -> Arc<MetricsRegistry> {
        let config = MetricsConfiguration::builder().enabled(enabled).build().unwrap();
        MetricsRegistry::new(config, Arc::new(RecordingBackend::new())).unwrap()
    }

    fn capture_created(registry: &MetricsRegistry) -> Arc<Mutex<Vec<ActorContext>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry
            .events()
            .actor_created()
            .register(listener(move |event: &ActorCreated| {
                sink.lock().push(event.context.clone());
                Ok(())
            }));
        seen
    }

    #[test]
    fn test_unset_handle_is_a_noop() {
        let emitter = EventEmitter::new(TestResolver, RegistryHandle::new());
        let actor = TestActorRef::user("a", "A");

        emitter.actor_created(&actor);
        emitter.envelope_created(&actor, EnvelopeId::next(), 0);
        assert_eq!(emitter.process_enter(&actor, Some("Ping")), None);
    }

    #[test]
    fn test_dispatches_resolved_context() {
        let handle = RegistryHandle::new();
        let registry = registry(true);
        let seen = capture_created(&registry);
        handle.set(registry);

        let emitter = EventEmitter::new(TestResolver, handle);
        emitter.actor_created(&TestActorRef::user("a", "A"));
        emitter.actor_created(&TestActorRef::broken());

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].path(), "test://sys/user/a");
        assert!(seen[1].is_unknown());
    }

    #[test]
    fn test_disabled_registry_skips_dispatch() {
        let handle = RegistryHandle::new();
        let registry = registry(false);
        let seen = capture_created(&registry);
        handle.set(registry);

        let emitter = EventEmitter::new(TestResolver, handle);
        emitter.actor_created(&TestActorRef::user("a", "A"));
        assert!(seen.lock().is_empty());
    }
}
