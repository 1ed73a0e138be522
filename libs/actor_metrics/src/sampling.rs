//! Sampling decisions
//!
//! Independent of filtering: a sampled-out event is simply not recorded.
//! `RateBased(rate)` draws a fresh uniform `f64` in `[0, 1)` per call from the
//! calling thread's RNG and accepts iff `draw < rate`, so the accept fraction
//! converges to `rate`.

use crate::{MetricsError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "rate", rename_all = "snake_case")]
pub enum SamplingConfig {
    /// Record every event
    #[default]
    Always,
    /// Record each event with probability `rate`
    RateBased(f64),
}

impl SamplingConfig {
    pub fn rate(rate: f64) -> Self {
        SamplingConfig::RateBased(rate)
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            SamplingConfig::Always => Ok(()),
            SamplingConfig::RateBased(rate) if (0.0..=1.0).contains(&rate) => Ok(()),
            SamplingConfig::RateBased(rate) => Err(MetricsError::InvalidSamplingRate { rate }),
        }
    }

    /// Effective acceptance probability
    pub fn effective_rate(&self) -> f64 {
        match *self {
            SamplingConfig::Always => 1.0,
            SamplingConfig::RateBased(rate) => rate,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplingDecider {
    config: SamplingConfig,
}

impl SamplingDecider {
    pub fn new(config: SamplingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn always() -> Self {
        Self {
            config: SamplingConfig::Always,
        }
    }

    pub fn config(&self) -> SamplingConfig {
        self.config
    }

    /// Accept or reject one event
    #[inline]
    pub fn sample(&self) -> bool {
        match self.config {
            SamplingConfig::Always => true,
            SamplingConfig::RateBased(rate) if rate >= 1.0 => true,
            SamplingConfig::RateBased(rate) if rate <= 0.0 => false,
            SamplingConfig::RateBased(rate) => rand::thread_rng().gen::<f64>() < rate,
        }
    }
}

impl Default for SamplingDecider {
    fn default() -> Self {
        Self::always()
    }
}
