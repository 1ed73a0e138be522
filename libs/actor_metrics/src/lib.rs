//! # Actor Metrics
//!
//! Runtime metrics collection and filtering for message-passing actor
//! runtimes: actor lifecycle, mailbox sizes and latency, and message
//! processing time.
//!
//! ## Flow
//!
//! ```text
//! host hook point -> EventEmitter -> EventHub fan-out -> module listener
//!     -> MetricsRegistry gate (enabled, module, filter, sample) -> MetricsBackend
//! ```
//!
//! Nothing on this path blocks or returns an error to the host. Failures in
//! context resolution, listeners or the backend are logged at low severity and
//! cost a data point; configuration errors fail fast at build time.
//!
//! ## Usage
//!
//! ```rust
//! use actor_metrics::test_utils::{TestActorRef, TestResolver};
//! use actor_metrics::{
//!     DefaultModules, EventEmitter, FilterConfig, MetricsConfiguration, MetricsRegistry,
//!     RecordingBackend, RegistryHandle,
//! };
//! use std::sync::Arc;
//!
//! // Hooks are installed first, the registry is published later
//! let handle = RegistryHandle::new();
//! let emitter = EventEmitter::new(TestResolver, handle.clone());
//!
//! let config = MetricsConfiguration::builder()
//!     .tag("service", "orders")
//!     .filters(FilterConfig::new().include_actor("**/user/**"))
//!     .build()
//!     .unwrap();
//! let registry = MetricsRegistry::new(config, Arc::new(RecordingBackend::new())).unwrap();
//! let modules = DefaultModules::install(&registry).unwrap();
//! handle.set(registry);
//!
//! emitter.actor_created(&TestActorRef::user("order-1", "OrderActor"));
//! assert_eq!(modules.lifecycle.active_count("OrderActor"), 1);
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod context;
pub mod emitter;
pub mod env;
pub mod error;
pub mod events;
pub mod fanout;
pub mod filter;
pub mod handle;
pub mod modules;
pub mod names;
pub mod registry;
pub mod sampling;
pub mod tags;
pub mod test_utils;
pub mod tracker;

pub use backend::{
    GaugeFn, GaugeSink, MetricKey, MetricsBackend, MetricsRsBackend, RecordingBackend,
    TimerSnapshot,
};
pub use clock::{monotonic_now_ns, Clock, ManualClock, MonotonicClock};
pub use config::{
    MailboxTrackingConfig, MetricsConfiguration, MetricsConfigurationBuilder, ModuleConfig,
};
pub use context::{resolve_or_unknown, ActorContext, ContextResolver};
pub use emitter::EventEmitter;
pub use env::EnvironmentOverlay;
pub use error::{MetricsError, Result};
pub use events::{
    ActorCreated, ActorTerminated, EnvelopeCopied, EnvelopeCreated, EnvelopeDequeued, EnvelopeId,
    ProcessEnter, ProcessExit,
};
pub use fanout::{listener, EventHub, EventListener, FanOut, ListenerRef};
pub use filter::{FilterConfig, FilterEngine, GlobPattern};
pub use handle::RegistryHandle;
pub use modules::{
    DefaultModules, InstrumentationModule, LifecycleModule, MailboxModule, MessageProcessingModule,
};
pub use registry::{MetricsRegistry, MetricsRegistryBuilder};
pub use sampling::{SamplingConfig, SamplingDecider};
pub use tags::Tags;
pub use tracker::MailboxLatencyTracker;
