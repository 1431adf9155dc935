//! # Controller Configuration
//!
//! Configuration loaded from environment variables (populated from a ConfigMap
//! using `envFrom` in the deployment), then overridden by command line flags.
//!
//! All configuration has sensible defaults.

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
