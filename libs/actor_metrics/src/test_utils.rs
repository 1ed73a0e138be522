use crate::fanout::EventListener;
use crate::{ActorContext, ContextResolver, MetricsError, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stand-in for a host runtime's native actor reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestActorRef {
    pub path: String,
    pub class: String,
}

impl TestActorRef {
    pub fn new(path: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            class: class.into(),
        }
    }

    /// Actor under the user guardian, e.g. `test://sys/user/<name>`
    pub fn user(name: &str, class: impl Into<String>) -> Self {
        Self::new(format!("test://sys/user/{}", name), class)
    }

    /// A reference the resolver cannot introspect
    pub fn broken() -> Self {
        Self::new("", "")
    }
}

/// Resolver over [`TestActorRef`]; fails for references with an empty path
#[derive(Debug, Default, Clone, Copy)]
pub struct TestResolver;

impl ContextResolver for TestResolver {
    type Handle = TestActorRef;

    fn resolve(&self, handle: &TestActorRef) -> Result<ActorContext> {
        if handle.path.is_empty() {
            return Err(MetricsError::context_resolution("actor reference has no path"));
        }
        Ok(ActorContext::new(handle.path.as_str(), handle.class.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    Error,
    Panic,
}

/// Listener that fails on every event, for isolation tests
#[derive(Debug)]
pub struct FailingListener {
    mode: FailureMode,
    calls: AtomicU64,
}

impl FailingListener {
    /// Return an error from every call
    pub fn erroring() -> Self {
        Self {
            mode: FailureMode::Error,
            calls: AtomicU64::new(0),
        }
    }

    /// Panic on every call
    pub fn panicking() -> Self {
        Self {
            mode: FailureMode::Panic,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<E> EventListener<E> for FailingListener {
    fn on_event(&self, _event: &E) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FailureMode::Error => anyhow::bail!("failing listener"),
            FailureMode::Panic => panic!("panicking listener"),
        }
    }
}
