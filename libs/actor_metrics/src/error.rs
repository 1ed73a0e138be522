//! Error Types
//!
//! Configuration errors are raised synchronously while building a
//! [`MetricsConfiguration`](crate::MetricsConfiguration). Everything else is
//! caught inside the engine and degrades to a missing data point.

use thiserror::Error;

/// Main error type for the metrics engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// A filter glob could not be compiled
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Sampling rate outside of `[0.0, 1.0]` (or not a number)
    #[error("Sampling rate {rate} is outside [0.0, 1.0]")]
    InvalidSamplingRate { rate: f64 },

    /// A required field was empty or absent
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Generic configuration errors (environment overlay parsing etc.)
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Native handle introspection failed
    #[error("Context resolution failed: {0}")]
    ContextResolution(String),

    /// A call into the metrics backend failed
    #[error("Metrics backend failure: {0}")]
    Backend(String),
}

/// Convenience alias for `Result<T, MetricsError>`.
pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        MetricsError::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        MetricsError::MissingField {
            field: field.into(),
        }
    }

    /// Create a configuration error with optional field context
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        MetricsError::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn context_resolution(message: impl Into<String>) -> Self {
        MetricsError::ContextResolution(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        MetricsError::Backend(message.into())
    }

    /// True for the errors that can only be produced at build time
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            MetricsError::InvalidPattern { .. }
                | MetricsError::InvalidSamplingRate { .. }
                | MetricsError::MissingField { .. }
                | MetricsError::Configuration { .. }
        )
    }
}

impl From<config_crate::ConfigError> for MetricsError {
    fn from(err: config_crate::ConfigError) -> Self {
        MetricsError::configuration(err.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MetricsError::invalid_pattern("a**", "'**' must be a whole segment");
        assert_eq!(
            err.to_string(),
            "Invalid glob pattern 'a**': '**' must be a whole segment"
        );

        let err = MetricsError::InvalidSamplingRate { rate: 1.5 };
        assert_eq!(err.to_string(), "Sampling rate 1.5 is outside [0.0, 1.0]");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(MetricsError::missing_field("tag key").is_configuration_error());
        assert!(MetricsError::configuration("bad value", Some("enabled")).is_configuration_error());
        assert!(!MetricsError::backend("down").is_configuration_error());
        assert!(!MetricsError::context_resolution("no path").is_configuration_error());
    }
}
