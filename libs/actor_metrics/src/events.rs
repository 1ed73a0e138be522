//! Runtime event types
//!
//! One struct per event kind delivered by the host's hook points. Contexts are
//! already resolved when an event is built, see [`EventEmitter`](crate::EventEmitter).

use crate::ActorContext;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ENVELOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one in-flight envelope
///
/// Ids come from a process-wide monotonically increasing sequence, so two
/// structurally identical messages always have distinct identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvelopeId(u64);

impl EnvelopeId {
    /// Allocate the next id in the sequence
    pub fn next() -> Self {
        Self(NEXT_ENVELOPE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap an id allocated by the host runtime
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "envelope-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ActorCreated {
    pub context: ActorContext,
}

#[derive(Debug, Clone)]
pub struct ActorTerminated {
    pub context: ActorContext,
}

/// A message was enqueued into `receiver`'s mailbox
#[derive(Debug, Clone)]
pub struct EnvelopeCreated {
    pub envelope: EnvelopeId,
    pub receiver: ActorContext,
    pub timestamp_ns: u64,
}

/// The same logical message was re-wrapped under a new identity
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCopied {
    pub original: EnvelopeId,
    pub copy: EnvelopeId,
}

#[derive(Debug, Clone)]
pub struct EnvelopeDequeued {
    pub envelope: EnvelopeId,
    pub receiver: ActorContext,
}

#[derive(Debug, Clone)]
pub struct ProcessEnter {
    pub context: ActorContext,
}

/// Message handling finished; `entered_at_ns` is the matching enter time
#[derive(Debug, Clone)]
pub struct ProcessExit {
    pub context: ActorContext,
    pub entered_at_ns: u64,
    /// Type name of the error the handler failed with
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_ids_are_unique_and_increasing() {
        let a = EnvelopeId::next();
        let b = EnvelopeId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(EnvelopeId::from_raw(7).as_u64(), 7);
        assert_eq!(EnvelopeId::from_raw(7).to_string(), "envelope-7");
    }
}
