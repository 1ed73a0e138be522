//! Metrics Configuration
//!
//! [`MetricsConfiguration`] is immutable and produced by
//! [`MetricsConfigurationBuilder::build`], which validates every field and
//! compiles the filter patterns. A configuration that exists is therefore
//! always usable on the hot path; all configuration errors surface at build
//! time.
//!
//! ## Precedence
//!
//! ```text
//! defaults  <  environment overlay  <  explicit builder calls
//! ```
//!
//! ## Example
//!
//! ```rust
//! use actor_metrics::{FilterConfig, MetricsConfiguration, ModuleConfig, SamplingConfig};
//!
//! let config = MetricsConfiguration::builder()
//!     .enabled(true)
//!     .tag("service", "orders")
//!     .sampling(SamplingConfig::rate(0.25))
//!     .filters(FilterConfig::new().include_actor("**/user/**"))
//!     .module("mailbox", ModuleConfig::disabled())
//!     .build()
//!     .unwrap();
//!
//! assert!(!config.is_module_enabled("mailbox"));
//! assert!(config.is_module_enabled("lifecycle"));
//! ```

use crate::env::EnvironmentOverlay;
use crate::{FilterConfig, FilterEngine, MetricsError, Result, SamplingConfig, Tags};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default maximum age of an untracked-but-never-dequeued envelope entry
pub const DEFAULT_MAX_ENTRY_AGE: Duration = Duration::from_secs(300);

/// Default number of envelope creations between amortized sweeps
pub const DEFAULT_SWEEP_EVERY: u64 = 4096;

/// Per-module switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub enabled: bool,
}

impl ModuleConfig {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self::enabled()
    }
}

/// Reclamation policy for the mailbox latency tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxTrackingConfig {
    /// Entries older than this are considered abandoned
    pub max_entry_age: Duration,
    /// Run a sweep every `sweep_every` envelope creations
    pub sweep_every: u64,
}

impl Default for MailboxTrackingConfig {
    fn default() -> Self {
        Self {
            max_entry_age: DEFAULT_MAX_ENTRY_AGE,
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }
}

impl MailboxTrackingConfig {
    fn validate(&self) -> Result<()> {
        if self.max_entry_age.is_zero() {
            return Err(MetricsError::configuration(
                "max_entry_age must be greater than zero",
                Some("mailbox.max_entry_age"),
            ));
        }
        if self.sweep_every == 0 {
            return Err(MetricsError::configuration(
                "sweep_every must be greater than zero",
                Some("mailbox.sweep_every"),
            ));
        }
        Ok(())
    }
}

/// Validated, immutable engine configuration
#[derive(Debug, Clone)]
pub struct MetricsConfiguration {
    enabled: bool,
    global_tags: Tags,
    sampling: SamplingConfig,
    filters: FilterConfig,
    filter_engine: Arc<FilterEngine>,
    modules: HashMap<String, ModuleConfig>,
    mailbox: MailboxTrackingConfig,
}

impl MetricsConfiguration {
    pub fn builder() -> MetricsConfigurationBuilder {
        MetricsConfigurationBuilder::default()
    }

    /// Master switch
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn global_tags(&self) -> &Tags {
        &self.global_tags
    }

    pub fn sampling(&self) -> SamplingConfig {
        self.sampling
    }

    pub fn filters(&self) -> &FilterConfig {
        &self.filters
    }

    /// Compiled form of [`filters`](Self::filters)
    pub fn filter_engine(&self) -> &Arc<FilterEngine> {
        &self.filter_engine
    }

    pub fn module_config(&self, module_id: &str) -> Option<ModuleConfig> {
        self.modules.get(module_id).copied()
    }

    /// Modules without explicit configuration are enabled
    pub fn is_module_enabled(&self, module_id: &str) -> bool {
        self.modules
            .get(module_id)
            .map_or(true, |module| module.enabled)
    }

    pub fn mailbox_tracking(&self) -> MailboxTrackingConfig {
        self.mailbox
    }
}

impl Default for MetricsConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            global_tags: Tags::new(),
            sampling: SamplingConfig::Always,
            filters: FilterConfig::default(),
            filter_engine: Arc::new(FilterEngine::allow_all()),
            modules: HashMap::new(),
            mailbox: MailboxTrackingConfig::default(),
        }
    }
}

/// Builder for [`MetricsConfiguration`]
///
/// Setters never fail; problems are reported by [`build`](Self::build).
#[derive(Debug, Default, Clone)]
pub struct MetricsConfigurationBuilder {
    enabled: Option<bool>,
    tags: Tags,
    sampling: Option<SamplingConfig>,
    filters: FilterConfig,
    modules: HashMap<String, ModuleConfig>,
    mailbox: Option<MailboxTrackingConfig>,
    overlay: Option<EnvironmentOverlay>,
    pending_error: Option<MetricsError>,
}

impl MetricsConfigurationBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Add a global tag; the last value for a key wins
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        if key.trim().is_empty() {
            self.record_error(MetricsError::missing_field("tag key"));
        } else {
            self.tags.insert(key, value);
        }
        self
    }

    pub fn sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = Some(sampling);
        self
    }

    pub fn filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }

    pub fn module(mut self, module_id: impl Into<String>, config: ModuleConfig) -> Self {
        let module_id = module_id.into();
        if module_id.trim().is_empty() {
            self.record_error(MetricsError::missing_field("module id"));
        } else {
            self.modules.insert(module_id, config);
        }
        self
    }

    pub fn mailbox_tracking(mut self, mailbox: MailboxTrackingConfig) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    /// Layer environment-derived settings beneath explicit builder calls
    pub fn environment(mut self, overlay: EnvironmentOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Read the process environment and layer it beneath explicit calls
    pub fn with_process_environment(self) -> Result<Self> {
        Ok(self.environment(EnvironmentOverlay::from_env()?))
    }

    fn record_error(&mut self, error: MetricsError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(error);
        }
    }

    pub fn build(self) -> Result<MetricsConfiguration> {
        if let Some(error) = self.pending_error {
            return Err(error);
        }

        let overlay = self.overlay.unwrap_or_default();

        let enabled = self.enabled.or(overlay.enabled).unwrap_or(true);

        let sampling = self
            .sampling
            .or_else(|| overlay.sampling_rate.map(SamplingConfig::RateBased))
            .unwrap_or_default();
        sampling.validate()?;

        let mut global_tags = Tags::new();
        for (key, value) in overlay.sorted_tags() {
            global_tags.insert(key, value);
        }
        for (key, value) in self.tags.iter() {
            global_tags.insert(key, value);
        }

        let mut modules = overlay.module_configs();
        modules.extend(self.modules);

        let mailbox = self.mailbox.unwrap_or_default();
        mailbox.validate()?;

        let filter_engine = Arc::new(FilterEngine::compile(&self.filters)?);

        Ok(MetricsConfiguration {
            enabled,
            global_tags,
            sampling,
            filters: self.filters,
            filter_engine,
            modules,
            mailbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MetricsConfiguration::builder().build().unwrap();
        assert!(config.is_enabled());
        assert!(config.global_tags().is_empty());
        assert_eq!(config.sampling(), SamplingConfig::Always);
        assert!(config.is_module_enabled("anything"));
        assert_eq!(config.mailbox_tracking(), MailboxTrackingConfig::default());
        assert!(config.filter_engine().matches_path("sys://x"));
    }

    #[test]
    fn test_tags_last_write_wins() {
        let config = MetricsConfiguration::builder()
            .tag("service", "a")
            .tag("region", "eu")
            .tag("service", "b")
            .build()
            .unwrap();
        let tags: Vec<_> = config.global_tags().iter().collect();
        assert_eq!(tags, vec![("service", "b"), ("region", "eu")]);
    }

    #[test]
    fn test_invalid_sampling_rejected_at_build() {
        let err = MetricsConfiguration::builder()
            .sampling(SamplingConfig::rate(2.0))
            .build()
            .unwrap_err();
        assert_eq!(err, MetricsError::InvalidSamplingRate { rate: 2.0 });
    }

    #[test]
    fn test_invalid_pattern_rejected_at_build() {
        let err = MetricsConfiguration::builder()
            .filters(FilterConfig::new().include_actor("user**"))
            .build()
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidPattern { .. }));
    }

    #[test]
    fn test_empty_keys_rejected() {
        let err = MetricsConfiguration::builder()
            .tag("  ", "x")
            .build()
            .unwrap_err();
        assert_eq!(err, MetricsError::missing_field("tag key"));

        let err = MetricsConfiguration::builder()
            .module("", ModuleConfig::disabled())
            .build()
            .unwrap_err();
        assert_eq!(err, MetricsError::missing_field("module id"));
    }

    #[test]
    fn test_mailbox_tracking_validation() {
        let err = MetricsConfiguration::builder()
            .mailbox_tracking(MailboxTrackingConfig {
                max_entry_age: Duration::ZERO,
                sweep_every: 10,
            })
            .build()
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_module_switches() {
        let config = MetricsConfiguration::builder()
            .module("mailbox", ModuleConfig::disabled())
            .module("lifecycle", ModuleConfig::enabled())
            .build()
            .unwrap();
        assert!(!config.is_module_enabled("mailbox"));
        assert!(config.is_module_enabled("lifecycle"));
        assert_eq!(config.module_config("processing"), None);
    }
}
