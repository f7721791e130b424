//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};

/// Policy for stored bucket bytes that fail to deserialize.
///
/// The store never hard-codes this choice: briefly under-limiting a caller is
/// usually safer than failing the limiter outright, but that trade-off
/// belongs to whoever embeds the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptStatePolicy {
    /// Treat the record as absent and rebuild fresh state.
    Recreate,
    /// Surface a `CorruptState` error to the caller.
    Reject,
}

impl Default for CorruptStatePolicy {
    fn default() -> Self {
        CorruptStatePolicy::Recreate
    }
}

/// Tuning for the compare-and-swap protocol and state lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Maximum compare-and-swap attempts per consume call before surfacing
    /// contention
    #[serde(default = "default_cas_retry_budget")]
    pub cas_retry_budget: u32,

    /// Lower bound of the randomized backoff between retries, in milliseconds
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,

    /// Upper bound of the randomized backoff between retries, in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Multiplier applied to the slowest bandwidth's full-refill time when
    /// deriving record TTLs
    #[serde(default = "default_ttl_margin")]
    pub ttl_margin: u32,

    /// What to do with stored state that fails to deserialize
    #[serde(default)]
    pub corrupt_state_policy: CorruptStatePolicy,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            cas_retry_budget: default_cas_retry_budget(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            ttl_margin: default_ttl_margin(),
            corrupt_state_policy: CorruptStatePolicy::default(),
        }
    }
}

fn default_cas_retry_budget() -> u32 {
    10
}

fn default_backoff_min_ms() -> u64 {
    1
}

fn default_backoff_max_ms() -> u64 {
    10
}

fn default_ttl_margin() -> u32 {
    2
}

/// Main configuration for a Tollgate deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Store protocol tuning
    #[serde(default)]
    pub store: StoreSettings,

    /// Redis connection URL; when unset the in-process backend is used
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Path to a limit catalog file
    #[serde(default)]
    pub limits_path: Option<String>,
}

impl TollgateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TollgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TollgateError::Config(e.to_string()))?;
        Ok(config)
    }
}
