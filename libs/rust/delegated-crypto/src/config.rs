//! Configuration for the delegation client.

use std::time::Duration;

/// Configuration for [`DelegationClient`](crate::DelegationClient).
#[derive(Debug, Clone)]
pub struct DelegationConfig {
    /// Number of tasks the shared worker pool runs at once
    pub worker_pool_size: usize,
    /// Upper bound for one remote round trip
    pub request_timeout: Duration,
    /// Record Prometheus metrics
    pub metrics_enabled: bool,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            request_timeout: Duration::from_secs(30),
            metrics_enabled: true,
        }
    }
}

impl DelegationConfig {
    /// Create config from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DELEGATION_WORKER_POOL_SIZE") {
            config.worker_pool_size = val.parse().unwrap_or(config.worker_pool_size);
        }

        if let Ok(val) = std::env::var("DELEGATION_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.request_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("DELEGATION_METRICS_ENABLED") {
            config.metrics_enabled = val.parse().unwrap_or(true);
        }

        config
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.worker_pool_size == 0 {
            return Err(ConfigValidationError::InvalidPoolSize);
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigValidationError::InvalidRequestTimeout);
        }

        Ok(())
    }

    /// Set worker pool size.
    #[must_use]
    pub const fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set metrics enabled.
    #[must_use]
    pub const fn with_metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// Pool size is zero
    #[error("DELEGATION_WORKER_POOL_SIZE must be greater than 0")]
    InvalidPoolSize,

    /// Request timeout is zero
    #[error("DELEGATION_REQUEST_TIMEOUT_MS must be greater than 0")]
    InvalidRequestTimeout,
}
