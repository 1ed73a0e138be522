//! Common Test Utilities for the actor metrics engine
//!
//! Shared fixtures: tracing setup, a registry wired to a recording backend and
//! a manual clock, and an emitter over test actor references.

#![allow(dead_code)]

use actor_metrics::test_utils::{TestActorRef, TestResolver};
use actor_metrics::{
    Clock, DefaultModules, EventEmitter, ManualClock, MetricsConfiguration, MetricsRegistry,
    RecordingBackend, RegistryHandle,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber once per test binary; `RUST_LOG` controls output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub handle: RegistryHandle,
    pub registry: Arc<MetricsRegistry>,
    pub backend: Arc<RecordingBackend>,
    pub clock: Arc<ManualClock>,
    pub modules: DefaultModules,
    pub emitter: EventEmitter<TestResolver>,
}

impl Harness {
    /// Registry with the default modules, published on a fresh handle
    pub fn new(config: MetricsConfiguration) -> Self {
        init_tracing();

        let backend = Arc::new(RecordingBackend::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let registry = MetricsRegistry::builder(config)
            .backend(backend.clone())
            .clock(clock.clone() as Arc<dyn Clock>)
            .build()
            .expect("registry builds");
        let modules = DefaultModules::install(&registry).expect("modules install");

        let handle = RegistryHandle::new();
        handle.set(Arc::clone(&registry));
        let emitter = EventEmitter::new(TestResolver, handle.clone());

        Self {
            handle,
            registry,
            backend,
            clock,
            modules,
            emitter,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MetricsConfiguration::default())
    }
}

pub mod actors {
    use super::TestActorRef;

    pub fn order(n: usize) -> TestActorRef {
        TestActorRef::user(&format!("order-{}", n), "OrderActor")
    }

    pub fn temp_worker() -> TestActorRef {
        TestActorRef::new("scheme://sys/user/temp/worker", "TempWorker")
    }

    pub fn logger() -> TestActorRef {
        TestActorRef::new("scheme://sys/system/logger", "Logger")
    }
}
