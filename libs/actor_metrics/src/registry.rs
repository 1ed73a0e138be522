//! Metrics Registry
//!
//! The registry composes the immutable configuration, the compiled filters,
//! the sampling decider and the global tags into the decision every module
//! asks on each event: should this be recorded?
//!
//! ## Gates
//!
//! ```text
//! is_tracked(module, ctx)          = enabled && module enabled && filter(ctx)
//! should_instrument(module, ctx)   = is_tracked && sample()
//! should_instrument_message(..)    = is_tracked && message filter && sample()
//! ```
//!
//! Balanced state such as the active-actor gauge or mailbox sizes must use
//! [`MetricsRegistry::is_tracked`]; sampling both the increment and the
//! decrement independently would drift the gauge.
//!
//! The registry also owns the lifecycle of the instrumentation modules
//! registered against it.

use crate::backend::{MetricsBackend, MetricsRsBackend};
use crate::clock::{Clock, MonotonicClock};
use crate::fanout::EventHub;
use crate::modules::InstrumentationModule;
use crate::{ActorContext, MetricsConfiguration, Result, SamplingDecider, Tags};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub struct MetricsRegistry {
    config: MetricsConfiguration,
    sampler: SamplingDecider,
    backend: Arc<dyn MetricsBackend>,
    events: Arc<EventHub>,
    clock: Arc<dyn Clock>,
    modules: Mutex<Vec<Arc<dyn InstrumentationModule>>>,
}

impl MetricsRegistry {
    pub fn builder(config: MetricsConfiguration) -> MetricsRegistryBuilder {
        MetricsRegistryBuilder {
            config,
            backend: None,
            events: None,
            clock: None,
        }
    }

    /// Registry with its own event hub and the monotonic clock
    pub fn new(
        config: MetricsConfiguration,
        backend: Arc<dyn MetricsBackend>,
    ) -> Result<Arc<Self>> {
        Self::builder(config).backend(backend).build()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    #[inline]
    pub fn is_module_enabled(&self, module_id: &str) -> bool {
        self.config.is_enabled() && self.config.is_module_enabled(module_id)
    }

    /// Enabled and filter gates, without sampling
    #[inline]
    pub fn is_tracked(&self, module_id: &str, context: &ActorContext) -> bool {
        self.is_module_enabled(module_id) && self.config.filter_engine().matches(context)
    }

    /// Like [`is_tracked`](Self::is_tracked), additionally applying the
    /// message filter when the context carries a message type
    #[inline]
    pub fn is_message_tracked(&self, module_id: &str, context: &ActorContext) -> bool {
        self.is_tracked(module_id, context)
            && context
                .message_type()
                .map_or(true, |message_type| {
                    self.config.filter_engine().matches_message(message_type)
                })
    }

    /// Sampling decision alone, for callers that already checked `is_tracked`
    #[inline]
    pub fn sample(&self) -> bool {
        self.sampler.sample()
    }

    /// Full gate for `module_id`: enabled, filtered in and sampled
    #[inline]
    pub fn should_instrument(&self, module_id: &str, context: &ActorContext) -> bool {
        self.is_tracked(module_id, context) && self.sampler.sample()
    }

    /// Full gate including the message filter
    #[inline]
    pub fn should_instrument_message(&self, module_id: &str, context: &ActorContext) -> bool {
        self.is_message_tracked(module_id, context) && self.sampler.sample()
    }

    pub fn global_tags(&self) -> &Tags {
        self.config.global_tags()
    }

    /// Global tags with `extra` layered on top; metric tags win on conflict
    pub fn tags_for(&self, extra: &Tags) -> Tags {
        self.config.global_tags().merged(extra)
    }

    pub fn backend(&self) -> &Arc<dyn MetricsBackend> {
        &self.backend
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }

    pub fn config(&self) -> &MetricsConfiguration {
        &self.config
    }

    /// Initialise `module` against this registry.
    ///
    /// A module already registered under the same id is shut down first, so
    /// setup/teardown cycles never leave duplicate listeners behind.
    pub fn register_module(self: &Arc<Self>, module: Arc<dyn InstrumentationModule>) -> Result<()> {
        let module_id = module.module_id().to_string();

        let previous = {
            let mut modules = self.modules.lock();
            modules
                .iter()
                .position(|m| m.module_id() == module_id)
                .map(|index| modules.remove(index))
        };
        if let Some(previous) = previous {
            previous.shutdown();
            info!(module = %module_id, "Replaced previously registered module");
        }

        module.init(self)?;
        self.modules.lock().push(module);

        info!(
            module = %module_id,
            enabled = self.is_module_enabled(&module_id),
            "Registered instrumentation module"
        );
        Ok(())
    }

    /// Shut down and forget the module registered under `module_id`
    pub fn unregister_module(&self, module_id: &str) -> bool {
        let removed = {
            let mut modules = self.modules.lock();
            modules
                .iter()
                .position(|m| m.module_id() == module_id)
                .map(|index| modules.remove(index))
        };
        match removed {
            Some(module) => {
                module.shutdown();
                info!(module = %module_id, "Unregistered instrumentation module");
                true
            }
            None => false,
        }
    }

    pub fn module(&self, module_id: &str) -> Option<Arc<dyn InstrumentationModule>> {
        self.modules
            .lock()
            .iter()
            .find(|m| m.module_id() == module_id)
            .cloned()
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.modules
            .lock()
            .iter()
            .map(|m| m.module_id().to_string())
            .collect()
    }

    /// Shut down every registered module
    pub fn shutdown(&self) {
        let modules = std::mem::take(&mut *self.modules.lock());
        let count = modules.len();
        for module in modules {
            module.shutdown();
        }
        info!(modules = count, "Metrics registry shut down");
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("config", &self.config)
            .field("backend", &self.backend)
            .field("modules", &self.module_ids())
            .finish()
    }
}

pub struct MetricsRegistryBuilder {
    config: MetricsConfiguration,
    backend: Option<Arc<dyn MetricsBackend>>,
    events: Option<Arc<EventHub>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MetricsRegistryBuilder {
    pub fn backend(mut self, backend: Arc<dyn MetricsBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Share an event hub with the host's hook points
    pub fn events(mut self, events: Arc<EventHub>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Arc<MetricsRegistry>> {
        let sampler = SamplingDecider::new(self.config.sampling())?;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MetricsRsBackend::new()));

        info!(
            enabled = self.config.is_enabled(),
            sampling = ?self.config.sampling(),
            global_tags = %self.config.global_tags(),
            "Metrics registry created"
        );

        Ok(Arc::new(MetricsRegistry {
            config: self.config,
            sampler,
            backend,
            events: self.events.unwrap_or_default(),
            clock: self.clock.unwrap_or_else(|| Arc::new(MonotonicClock)),
            modules: Mutex::new(Vec::new()),
        }))
    }
}
