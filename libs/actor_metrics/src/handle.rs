//! Settable access point for the current registry
//!
//! Hook points may be installed before the application has built its
//! configuration. They hold a [`RegistryHandle`] that starts unset; every
//! event arriving while it is unset is dropped. Publishing a registry later
//! is a single atomic swap, visible to all clones of the handle.

use crate::MetricsRegistry;
use arc_swap::ArcSwapOption;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use tracing::info;

static GLOBAL_HANDLE: Lazy<RegistryHandle> = Lazy::new(RegistryHandle::new);

#[derive(Clone, Default)]
pub struct RegistryHandle {
    slot: Arc<ArcSwapOption<MetricsRegistry>>,
}

impl RegistryHandle {
    /// A fresh, unset handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide handle for hosts without their own injection mechanism
    pub fn global() -> Self {
        GLOBAL_HANDLE.clone()
    }

    /// Publish `registry`; returns the registry it replaced
    pub fn set(&self, registry: Arc<MetricsRegistry>) -> Option<Arc<MetricsRegistry>> {
        let previous = self.slot.swap(Some(registry));
        info!(replaced = previous.is_some(), "Metrics registry published");
        previous
    }

    /// Unset the handle; subsequent events are dropped
    pub fn clear(&self) -> Option<Arc<MetricsRegistry>> {
        self.slot.swap(None)
    }

    #[inline]
    pub fn current(&self) -> Option<Arc<MetricsRegistry>> {
        self.slot.load_full()
    }

    pub fn is_set(&self) -> bool {
        self.slot.load().is_some()
    }
}

impl fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("is_set", &self.is_set())
            .finish()
    }
}
