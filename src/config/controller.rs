//! # Controller Settings
//!
//! Worker pool, machine inventory and retry settings.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_MACHINE_NAMESPACE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY_MS,
    DEFAULT_RETRY_MAX_DELAY_SECS, DEFAULT_WORKERS,
};
use crate::controller::backoff::ExponentialBackoff;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers (`WORKERS`)
    pub workers: usize,
    /// Namespace the Machine objects live in (`MACHINE_NAMESPACE`)
    pub machine_namespace: String,
    /// Requeues allowed before a failing key is dropped (`MAX_RETRIES`)
    pub max_retries: u32,
    /// First retry delay (`RETRY_BASE_DELAY_MS`)
    pub retry_base_delay_ms: u64,
    /// Longest retry delay (`RETRY_MAX_DELAY_SECS`)
    pub retry_max_delay_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            machine_namespace: DEFAULT_MACHINE_NAMESPACE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_secs: DEFAULT_RETRY_MAX_DELAY_SECS,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env_var_or_default("WORKERS", defaults.workers).max(1),
            machine_namespace: env_var_or_default("MACHINE_NAMESPACE", defaults.machine_namespace),
            max_retries: env_var_or_default("MAX_RETRIES", defaults.max_retries),
            retry_base_delay_ms: env_var_or_default(
                "RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay_ms,
            ),
            retry_max_delay_secs: env_var_or_default(
                "RETRY_MAX_DELAY_SECS",
                defaults.retry_max_delay_secs,
            ),
        }
    }

    /// Backoff applied to rate limited requeues
    pub fn retry_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_secs(self.retry_max_delay_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.machine_namespace, "openshift-machine-api");
        assert_eq!(config.max_retries, 5);
        assert_eq!(
            config.retry_backoff().delay_for(0),
            Duration::from_millis(5)
        );
        assert_eq!(
            config.retry_backoff().delay_for(64),
            Duration::from_secs(1000)
        );
    }
}
