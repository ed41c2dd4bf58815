//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

/// Loop-level retry policy for oracle failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Amnis provider configuration. Loaded once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmnisConfig {
    /// Solana RPC endpoint of the Pyth program
    pub http_endpoint: String,
    pub ws_endpoint: String,
    /// First Pyth mapping account (base58)
    pub first_mapping: String,
    /// Pyth oracle program id (base58)
    pub program_key: String,
    pub update_interval_secs: u64,
    pub confidence_ratio_bps: u64,
    /// Aptos fullnode REST endpoint serving `/view`
    pub node_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl AmnisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("http_endpoint", &self.http_endpoint),
            ("ws_endpoint", &self.ws_endpoint),
            ("first_mapping", &self.first_mapping),
            ("program_key", &self.program_key),
            ("node_url", &self.node_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }

        if self.update_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            )));
        }

        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}
