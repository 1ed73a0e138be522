//! Metrics backend abstraction
//!
//! Modules emit through [`MetricsBackend`] and never talk to a monitoring
//! system directly. Every call returns a `Result` so that a failing backend is
//! caught at the module boundary and turned into a missing data point.
//!
//! Two adapters ship with the crate:
//!
//! - [`MetricsRsBackend`]: forwards to the `metrics` facade, so any installed
//!   `metrics` recorder/exporter receives the data
//! - [`RecordingBackend`]: keeps everything in memory for assertions and for
//!   hosts that poll values themselves

mod metrics_rs;
mod recording;

pub use metrics_rs::MetricsRsBackend;
pub use recording::{RecordingBackend, TimerSnapshot};

use crate::{Result, Tags};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Value supplier for pull-style gauges
pub type GaugeFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Receiver of every new value of a registered gauge
pub type GaugeSink = Arc<dyn Fn(f64) + Send + Sync>;

pub trait MetricsBackend: Send + Sync + Debug {
    /// Add `amount` to a monotonically increasing counter
    fn increment_counter(&self, name: &str, tags: &Tags, amount: u64) -> Result<()>;

    /// Register a gauge whose value is read from `supplier` on demand.
    /// Registering the same name and tags again replaces the supplier.
    fn register_gauge(&self, name: &str, tags: &Tags, supplier: GaugeFn) -> Result<()>;

    /// Sink for push-style backends, fetched once after a successful
    /// [`register_gauge`](Self::register_gauge). Backends that read the
    /// supplier on demand keep the default.
    fn gauge_sink(&self, _name: &str, _tags: &Tags) -> Option<GaugeSink> {
        None
    }

    /// Record one duration sample
    fn record_timer(&self, name: &str, tags: &Tags, duration: Duration) -> Result<()>;

    /// Record one distribution sample
    fn record_summary(&self, name: &str, tags: &Tags, amount: f64) -> Result<()>;
}

/// Identity of one time series: name plus tags sorted by key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    pub name: String,
    pub tags: Vec<(String, String)>,
}

impl MetricKey {
    pub fn new(name: &str, tags: &Tags) -> Self {
        Self {
            name: name.to_string(),
            tags: tags.sorted_pairs(),
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
