//! Actor Context Resolution
//!
//! Every runtime event is reduced to an [`ActorContext`] before any
//! instrumentation decision is made. How a context is obtained from the host
//! runtime's native actor handle is host specific and lives behind the
//! [`ContextResolver`] trait; the engine only depends on the trait.
//!
//! Resolution is failure tolerant: [`resolve_or_unknown`] turns errors and
//! panics into a context carrying [`UNKNOWN`] sentinels so that a broken
//! resolver can never destabilise the host.

use crate::Result;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;

/// Sentinel used for any field that could not be resolved
pub const UNKNOWN: &str = "unknown";

/// Stable identity of the actor an event refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorContext {
    path: Arc<str>,
    actor_class: Arc<str>,
    message_type: Option<Arc<str>>,
}

impl ActorContext {
    pub fn new(path: impl Into<Arc<str>>, actor_class: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            actor_class: actor_class.into(),
            message_type: None,
        }
    }

    /// Context used when resolution fails
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }

    /// Attach the type name of the message being handled
    pub fn with_message_type(mut self, message_type: impl Into<Arc<str>>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn actor_class(&self) -> &str {
        &self.actor_class
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn is_unknown(&self) -> bool {
        &*self.path == UNKNOWN && &*self.actor_class == UNKNOWN
    }
}

impl fmt::Display for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message_type {
            Some(message_type) => {
                write!(f, "{} [{}] <{}>", self.path, self.actor_class, message_type)
            }
            None => write!(f, "{} [{}]", self.path, self.actor_class),
        }
    }
}

/// Host specific introspection of native actor handles
pub trait ContextResolver: Send + Sync {
    /// Opaque handle type delivered by the host's hook points
    type Handle: ?Sized;

    /// Resolve path and class of the actor behind `handle`
    fn resolve(&self, handle: &Self::Handle) -> Result<ActorContext>;
}

/// Resolve a context, falling back to the sentinel context on any failure
pub fn resolve_or_unknown<R>(resolver: &R, handle: &R::Handle) -> ActorContext
where
    R: ContextResolver + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| resolver.resolve(handle))) {
        Ok(Ok(context)) => context,
        Ok(Err(e)) => {
            debug!(error = %e, "Actor context resolution failed, using sentinel");
            ActorContext::unknown()
        }
        Err(_) => {
            debug!("Actor context resolver panicked, using sentinel");
            ActorContext::unknown()
        }
    }
}
