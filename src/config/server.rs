//! # Server Configuration
//!
//! Settings of the metrics and probe HTTP server.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Port serving `/metrics`, `/healthz` and `/readyz` (`METRICS_PORT`)
    pub metrics_port: u16,
    /// How long startup waits for the server to bind (`SERVER_STARTUP_TIMEOUT_SECS`)
    pub startup_timeout_secs: u64,
    /// Poll interval while waiting for the bind (`SERVER_POLL_INTERVAL_MS`)
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", defaults.metrics_port),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                defaults.startup_timeout_secs,
            ),
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                defaults.poll_interval_ms,
            ),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
