use super::{GaugeFn, GaugeSink, MetricKey, MetricsBackend};
use crate::{Result, Tags};
use dashmap::DashMap;
use metrics::{counter, gauge, histogram, Label};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Adapter onto the `metrics` facade crate
///
/// Counters map to `counter!`, timers and summaries to `histogram!` (timers in
/// seconds). The facade has no pull-style gauges: every change is pushed
/// through the facade handle returned by [`gauge_sink`](MetricsBackend::gauge_sink).
/// Suppliers are kept as well, and [`publish_gauges`](Self::publish_gauges)
/// re-reads all of them, for example right before an exporter scrape.
#[derive(Default)]
pub struct MetricsRsBackend {
    prefix: Option<String>,
    gauges: DashMap<MetricKey, GaugeFn>,
}

impl MetricsRsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every metric name with `prefix.`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            gauges: DashMap::new(),
        }
    }

    fn full_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        }
    }

    fn labels(tags: &Tags) -> Vec<Label> {
        tags.iter()
            .map(|(key, value)| Label::new(key.to_string(), value.to_string()))
            .collect()
    }

    fn key_labels(key: &MetricKey) -> Vec<Label> {
        key.tags
            .iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect()
    }

    /// Push the current value of every registered gauge
    pub fn publish_gauges(&self) {
        let snapshot: Vec<(MetricKey, GaugeFn)> = self
            .gauges
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (key, supplier) in snapshot {
            gauge!(key.name.clone(), Self::key_labels(&key)).set(supplier());
        }
    }

    pub fn gauge_count(&self) -> usize {
        self.gauges.len()
    }
}

impl MetricsBackend for MetricsRsBackend {
    fn increment_counter(&self, name: &str, tags: &Tags, amount: u64) -> Result<()> {
        counter!(self.full_name(name), Self::labels(tags)).increment(amount);
        Ok(())
    }

    fn register_gauge(&self, name: &str, tags: &Tags, supplier: GaugeFn) -> Result<()> {
        let full_name = self.full_name(name);
        gauge!(full_name.clone(), Self::labels(tags)).set(supplier());
        self.gauges.insert(MetricKey::new(&full_name, tags), supplier);
        Ok(())
    }

    fn gauge_sink(&self, name: &str, tags: &Tags) -> Option<GaugeSink> {
        let gauge = gauge!(self.full_name(name), Self::labels(tags));
        Some(Arc::new(move |value: f64| gauge.set(value)))
    }

    fn record_timer(&self, name: &str, tags: &Tags, duration: Duration) -> Result<()> {
        histogram!(self.full_name(name), Self::labels(tags)).record(duration.as_secs_f64());
        Ok(())
    }

    fn record_summary(&self, name: &str, tags: &Tags, amount: f64) -> Result<()> {
        histogram!(self.full_name(name), Self::labels(tags)).record(amount);
        Ok(())
    }
}

impl fmt::Debug for MetricsRsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRsBackend")
            .field("prefix", &self.prefix)
            .field("gauges.len()", &self.gauges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActorCreated, ActorTerminated};
    use crate::{names, ActorContext, LifecycleModule, MetricsConfiguration, MetricsRegistry};
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Facade gauge that remembers the last value written to it
    #[derive(Default)]
    struct LastValue(AtomicU64);

    impl LastValue {
        fn get(&self) -> f64 {
            f64::from_bits(self.0.load(Ordering::Relaxed))
        }

        fn store(&self, value: f64) {
            self.0.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    impl metrics::GaugeFn for LastValue {
        fn increment(&self, value: f64) {
            self.store(self.get() + value);
        }

        fn decrement(&self, value: f64) {
            self.store(self.get() - value);
        }

        fn set(&self, value: f64) {
            self.store(value);
        }
    }

    /// Keeps gauges by name; counters and histograms are discarded
    #[derive(Default)]
    struct GaugeRecorder {
        gauges: DashMap<String, Arc<LastValue>>,
    }

    impl GaugeRecorder {
        fn value(&self, name: &str) -> Option<f64> {
            self.gauges.get(name).map(|gauge| gauge.get())
        }
    }

    impl Recorder for GaugeRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, _: &Key, _: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
            let gauge = self
                .gauges
                .entry(key.name().to_string())
                .or_default()
                .value()
                .clone();
            Gauge::from_arc(gauge)
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_gauge_follows_every_change() {
        let recorder = GaugeRecorder::default();

        metrics::with_local_recorder(&recorder, || {
            let registry = MetricsRegistry::new(
                MetricsConfiguration::default(),
                Arc::new(MetricsRsBackend::new()),
            )
            .unwrap();
            registry
                .register_module(Arc::new(LifecycleModule::new()))
                .unwrap();
            let events = registry.events();
            let context = ActorContext::new("sys://user/a", "Worker");

            events.actor_created().dispatch(&ActorCreated {
                context: context.clone(),
            });
            assert_eq!(recorder.value(names::ACTOR_ACTIVE), Some(1.0));

            events.actor_created().dispatch(&ActorCreated {
                context: context.clone(),
            });
            assert_eq!(recorder.value(names::ACTOR_ACTIVE), Some(2.0));

            for _ in 0..2 {
                events.actor_terminated().dispatch(&ActorTerminated {
                    context: context.clone(),
                });
            }
            assert_eq!(recorder.value(names::ACTOR_ACTIVE), Some(0.0));
        });
    }

    #[test]
    fn test_calls_succeed_without_installed_recorder() {
        let backend = MetricsRsBackend::with_prefix("actors");
        let tags = Tags::new().with("actor_class", "Worker");

        assert!(backend.increment_counter("created", &tags, 1).is_ok());
        assert!(backend
            .record_timer("mailbox.time", &tags, Duration::from_micros(5))
            .is_ok());
        assert!(backend.record_summary("batch", &tags, 3.0).is_ok());
        assert!(backend
            .register_gauge("active", &tags, Arc::new(|| 1.0))
            .is_ok());

        assert_eq!(backend.gauge_count(), 1);
        backend.publish_gauges();
    }

    #[test]
    fn test_prefix_applied() {
        assert_eq!(MetricsRsBackend::new().full_name("a.b"), "a.b");
        assert_eq!(MetricsRsBackend::with_prefix("p").full_name("a.b"), "p.a.b");
    }
}
