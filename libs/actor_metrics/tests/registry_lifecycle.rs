//! Registry publication, module registration cycles and failure isolation

mod common;

use actor_metrics::test_utils::{FailingListener, TestResolver};
use actor_metrics::{
    names, ActorCreated, DefaultModules, EnvironmentOverlay, EventEmitter, EventListener,
    LifecycleModule, MetricsConfiguration, MetricsRegistry, ModuleConfig, RecordingBackend,
    RegistryHandle, SamplingConfig,
};
use common::{actors, Harness};
use std::sync::Arc;

#[test]
fn events_before_publication_are_dropped() {
    common::init_tracing();
    let handle = RegistryHandle::new();
    let emitter = EventEmitter::new(TestResolver, handle.clone());

    // Hooks fire before the application finished wiring
    emitter.actor_created(&actors::order(1));
    assert_eq!(emitter.process_enter(&actors::order(1), Some("Ping")), None);

    let backend = Arc::new(RecordingBackend::new());
    let registry = MetricsRegistry::new(MetricsConfiguration::default(), backend.clone()).unwrap();
    let modules = DefaultModules::install(&registry).unwrap();
    handle.set(registry);

    emitter.actor_created(&actors::order(2));
    assert_eq!(modules.lifecycle.total_created(), 1);
    assert_eq!(backend.counter_total(names::ACTOR_CREATED), 1);

    handle.clear();
    emitter.actor_created(&actors::order(3));
    assert_eq!(modules.lifecycle.total_created(), 1);
}

#[test]
fn repeated_setup_and_teardown_cycles() {
    let h = Harness::with_defaults();

    for _ in 0..5 {
        let lifecycle = Arc::new(LifecycleModule::new());
        h.registry.register_module(lifecycle.clone()).unwrap();

        h.emitter.actor_created(&actors::order(1));
        assert_eq!(lifecycle.total_created(), 1);
        assert_eq!(h.registry.events().actor_created().len(), 1);
    }

    h.registry.shutdown();
    assert_eq!(h.registry.events().listener_count(), 0);
}

#[test]
fn failing_listener_does_not_starve_modules() {
    let h = Harness::with_defaults();
    let erroring = Arc::new(FailingListener::erroring());
    let panicking = Arc::new(FailingListener::panicking());

    let events = h.registry.events();
    events
        .actor_created()
        .register(erroring.clone() as Arc<dyn EventListener<ActorCreated>>);
    events
        .actor_created()
        .register(panicking.clone() as Arc<dyn EventListener<ActorCreated>>);
    // Registered after the failing ones
    let late = Arc::new(LifecycleModule::new());
    h.registry.register_module(late.clone()).unwrap();

    h.emitter.actor_created(&actors::order(1));

    assert_eq!(erroring.calls(), 1);
    assert_eq!(panicking.calls(), 1);
    assert_eq!(late.total_created(), 1);
    assert_eq!(events.actor_created().failure_count(), 2);
}

#[test]
fn backend_outage_never_reaches_the_host() {
    let h = Harness::with_defaults();
    h.backend.set_failing(true);
    let actor = actors::order(1);

    h.emitter.actor_created(&actor);
    let entered_at = h.emitter.process_enter(&actor, Some("PlaceOrder")).unwrap();
    h.emitter
        .process_exit(&actor, Some("PlaceOrder"), entered_at, Some("Boom"));
    h.emitter.actor_terminated(&actor);

    assert!(h.backend.rejected_calls() > 0);
    assert_eq!(h.modules.lifecycle.active_count("OrderActor"), 0);
    assert_eq!(h.modules.processing.inflight("OrderActor"), 0);
}

#[test]
fn disabled_module_is_silent() {
    let config = MetricsConfiguration::builder()
        .module(LifecycleModule::ID, ModuleConfig::disabled())
        .build()
        .unwrap();
    let h = Harness::new(config);

    h.emitter.actor_created(&actors::order(1));
    assert_eq!(h.modules.lifecycle.total_created(), 0);
    assert_eq!(h.backend.counter_total(names::ACTOR_CREATED), 0);
}

#[test]
fn builder_overrides_environment() {
    let overlay = EnvironmentOverlay::from_vars([
        ("ACTOR_METRICS__ENABLED", "false"),
        ("ACTOR_METRICS__SAMPLING_RATE", "0.5"),
        ("ACTOR_METRICS__TAGS__SERVICE", "from-env"),
        ("ACTOR_METRICS__TAGS__REGION", "eu"),
        ("ACTOR_METRICS__MODULES__MAILBOX__ENABLED", "false"),
    ])
    .unwrap();

    let config = MetricsConfiguration::builder()
        .environment(overlay)
        .enabled(true)
        .tag("service", "from-builder")
        .build()
        .unwrap();

    assert!(config.is_enabled());
    assert_eq!(config.sampling(), SamplingConfig::RateBased(0.5));
    assert_eq!(config.global_tags().get("service"), Some("from-builder"));
    assert_eq!(config.global_tags().get("region"), Some("eu"));
    assert!(!config.is_module_enabled("mailbox"));
}
