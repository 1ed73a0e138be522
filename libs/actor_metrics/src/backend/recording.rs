use super::{GaugeFn, MetricKey, MetricsBackend};
use crate::{MetricsError, Result, Tags};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Aggregated timer samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl TimerSnapshot {
    /// Fold one sample in
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.total += duration;
        self.max = self.max.max(duration);
    }

    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total.as_nanos() / self.count as u128) as u64)
    }
}

/// In-memory backend
///
/// Counters and timers aggregate per series; gauges keep their supplier and
/// are evaluated when read. [`set_failing`](Self::set_failing) makes every
/// call return [`MetricsError::Backend`], which is how backend outages are
/// simulated in tests.
#[derive(Default)]
pub struct RecordingBackend {
    counters: DashMap<MetricKey, AtomicU64>,
    gauges: DashMap<MetricKey, GaugeFn>,
    timers: DashMap<MetricKey, TimerSnapshot>,
    summaries: DashMap<MetricKey, Vec<f64>>,
    failing: AtomicBool,
    rejected_calls: AtomicU64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of calls rejected while failing
    pub fn rejected_calls(&self) -> u64 {
        self.rejected_calls.load(Ordering::Relaxed)
    }

    fn check_available(&self, name: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            return Err(MetricsError::backend(format!(
                "recording backend unavailable for '{}'",
                name
            )));
        }
        Ok(())
    }

    pub fn counter(&self, name: &str, tags: &Tags) -> u64 {
        self.counters
            .get(&MetricKey::new(name, tags))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Sum of a counter across every tag set
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|entry| entry.key().name == name)
            .map(|entry| entry.value().load(Ordering::Relaxed))
            .sum()
    }

    pub fn gauge(&self, name: &str, tags: &Tags) -> Option<f64> {
        let supplier = self.gauges.get(&MetricKey::new(name, tags))?.value().clone();
        Some(supplier())
    }

    /// Sum of a gauge across every tag set
    pub fn gauge_total(&self, name: &str) -> f64 {
        let suppliers: Vec<GaugeFn> = self
            .gauges
            .iter()
            .filter(|entry| entry.key().name == name)
            .map(|entry| entry.value().clone())
            .collect();
        suppliers.iter().map(|supplier| supplier()).sum()
    }

    pub fn timer(&self, name: &str, tags: &Tags) -> Option<TimerSnapshot> {
        self.timers.get(&MetricKey::new(name, tags)).map(|t| *t)
    }

    /// Number of timer samples across every tag set
    pub fn timer_count(&self, name: &str) -> u64 {
        self.timers
            .iter()
            .filter(|entry| entry.key().name == name)
            .map(|entry| entry.value().count)
            .sum()
    }

    pub fn summary_samples(&self, name: &str, tags: &Tags) -> Vec<f64> {
        self.summaries
            .get(&MetricKey::new(name, tags))
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Every series recorded under `name`, sorted
    pub fn series(&self, name: &str) -> Vec<MetricKey> {
        let mut keys: Vec<MetricKey> = self
            .counters
            .iter()
            .map(|e| e.key().clone())
            .chain(self.gauges.iter().map(|e| e.key().clone()))
            .chain(self.timers.iter().map(|e| e.key().clone()))
            .chain(self.summaries.iter().map(|e| e.key().clone()))
            .filter(|key| key.name == name)
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn reset(&self) {
        self.counters.clear();
        self.gauges.clear();
        self.timers.clear();
        self.summaries.clear();
        self.rejected_calls.store(0, Ordering::Relaxed);
    }
}

impl MetricsBackend for RecordingBackend {
    fn increment_counter(&self, name: &str, tags: &Tags, amount: u64) -> Result<()> {
        self.check_available(name)?;
        self.counters
            .entry(MetricKey::new(name, tags))
            .or_default()
            .fetch_add(amount, Ordering::Relaxed);
        Ok(())
    }

    fn register_gauge(&self, name: &str, tags: &Tags, supplier: GaugeFn) -> Result<()> {
        self.check_available(name)?;
        self.gauges.insert(MetricKey::new(name, tags), supplier);
        Ok(())
    }

    fn record_timer(&self, name: &str, tags: &Tags, duration: Duration) -> Result<()> {
        self.check_available(name)?;
        self.timers
            .entry(MetricKey::new(name, tags))
            .or_default()
            .record(duration);
        Ok(())
    }

    fn record_summary(&self, name: &str, tags: &Tags, amount: f64) -> Result<()> {
        self.check_available(name)?;
        self.summaries
            .entry(MetricKey::new(name, tags))
            .or_default()
            .push(amount);
        Ok(())
    }
}

impl fmt::Debug for RecordingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingBackend")
            .field("counters.len()", &self.counters.len())
            .field("gauges.len()", &self.gauges.len())
            .field("timers.len()", &self.timers.len())
            .field("summaries.len()", &self.summaries.len())
            .field("failing", &self.failing.load(Ordering::Relaxed))
            .finish()
    }
}
