//! Metrics configuration.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// Default metric name prefix.
pub const DEFAULT_NAMESPACE: &str = "unpackerr";

/// Default listen address of the `/metrics` endpoint.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:5656";

/// Bucket bounds for upstream queue fetch latency, in seconds.
pub const DEFAULT_FETCH_BUCKETS: [f64; 7] = [0.005, 0.025, 0.1, 0.5, 1.0, 3.0, 10.0];

/// Bucket bounds for extraction duration, in seconds.
pub const DEFAULT_EXTRACT_BUCKETS: [f64; 7] = [10.0, 60.0, 300.0, 1800.0, 3600.0, 7200.0, 14400.0];

/// Metrics subsystem configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are collected at all
    pub enabled: bool,
    /// Prefix prepended to every metric name
    pub namespace: String,
    /// Socket address the HTTP endpoint binds to
    pub listen_address: String,
    /// Histogram buckets for queue fetch latency
    pub fetch_buckets: Vec<f64>,
    /// Histogram buckets for extraction duration
    pub extract_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: DEFAULT_NAMESPACE.to_string(),
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            fetch_buckets: DEFAULT_FETCH_BUCKETS.to_vec(),
            extract_buckets: DEFAULT_EXTRACT_BUCKETS.to_vec(),
        }
    }
}

impl MetricsConfig {
    /// Load metrics config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `METRICS_ENABLED` (`true`/`false`)
    /// - `METRICS_NAMESPACE` (e.g. "unpackerr")
    /// - `METRICS_LISTEN_ADDRESS` (e.g. "127.0.0.1:5656")
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`MetricsConfig::from_env_or_default`], reading variables
    /// through `lookup`. Unparsable or blank values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(enabled) = lookup("METRICS_ENABLED")
            && let Ok(parsed) = enabled.trim().parse::<bool>()
        {
            config.enabled = parsed;
        }

        if let Some(namespace) = lookup("METRICS_NAMESPACE")
            && !namespace.trim().is_empty()
        {
            config.namespace = namespace.trim().to_string();
        }

        if let Some(address) = lookup("METRICS_LISTEN_ADDRESS")
            && !address.trim().is_empty()
        {
            config.listen_address = address.trim().to_string();
        }

        config
    }

    /// Parsed listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            MetricsError::config(format!(
                "invalid listen address '{}': {}",
                self.listen_address, e
            ))
        })
    }

    /// Check the configuration before any metric is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(MetricsError::config("namespace must not be empty"));
        }
        self.socket_addr()?;
        validate_buckets("fetch_buckets", &self.fetch_buckets)?;
        validate_buckets("extract_buckets", &self.extract_buckets)?;
        Ok(())
    }
}

fn validate_buckets(field: &str, buckets: &[f64]) -> Result<()> {
    if buckets.is_empty() {
        return Err(MetricsError::config(format!("{field} must not be empty")));
    }
    if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(MetricsError::config(format!(
            "{field} must be strictly increasing"
        )));
    }
    Ok(())
}
