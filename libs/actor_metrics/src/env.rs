//! Environment-derived configuration overlay
//!
//! Recognised variables (prefix `ACTOR_METRICS`, separator `__`):
//!
//! ```text
//! ACTOR_METRICS__ENABLED=false
//! ACTOR_METRICS__SAMPLING_RATE=0.25
//! ACTOR_METRICS__TAGS__REGION=eu-west-1
//! ACTOR_METRICS__MODULES__MAILBOX__ENABLED=false
//! ```
//!
//! Keys are lower-cased by the `config` crate, so `TAGS__REGION` yields the
//! tag key `region`. Values stay strings until a typed field asks for a bool
//! or a float, so tag values such as `1.10` or `007` arrive verbatim.
//! Explicit builder calls take precedence over every value read here.

use crate::{ModuleConfig, Result};
use config_crate::{Config, Environment, Map};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Prefix shared by every recognised variable
pub const ENV_PREFIX: &str = "ACTOR_METRICS";

/// Separator between the prefix and nested key segments
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnvironmentOverlay {
    pub enabled: Option<bool>,
    pub sampling_rate: Option<f64>,
    pub tags: HashMap<String, String>,
    pub modules: HashMap<String, ModuleOverlay>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModuleOverlay {
    pub enabled: Option<bool>,
}

impl EnvironmentOverlay {
    /// Read the overlay from the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(Self::environment())
    }

    /// Read the overlay from an explicit set of variables
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let source: Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(Self::environment().source(Some(source)))
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
    }

    fn load(environment: Environment) -> Result<Self> {
        let overlay: EnvironmentOverlay = Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        if !overlay.is_empty() {
            debug!(?overlay, "Loaded metrics configuration from environment");
        }
        Ok(overlay)
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.sampling_rate.is_none()
            && self.tags.is_empty()
            && self.modules.is_empty()
    }

    /// Tags in key order so the merged tag order is deterministic
    pub fn sorted_tags(&self) -> Vec<(&str, &str)> {
        let mut tags: Vec<_> = self
            .tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        tags.sort();
        tags
    }

    /// Module switches that were actually set
    pub fn module_configs(&self) -> HashMap<String, ModuleConfig> {
        self.modules
            .iter()
            .filter_map(|(id, module)| {
                module
                    .enabled
                    .map(|enabled| (id.clone(), ModuleConfig { enabled }))
            })
            .collect()
    }
}
