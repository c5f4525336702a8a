//! Runtime configuration for operational parameters
//!
//! These types control runtime behavior: network timeouts, download retry
//! policy, telemetry cadence, rollback windows, and sync deadlines. All
//! sections deserialize from an optional `airlift.yaml`; an absent file or
//! absent section falls back to the defaults, which encode the documented
//! behavior of each component.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::retry::BackoffPolicy;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Network and HTTP configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Backoff policy for download transfers
    #[serde(default)]
    pub download_retry: BackoffPolicy,

    /// Telemetry reporter configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Rollback watchdog configuration
    #[serde(default)]
    pub rollback: RollbackConfig,

    /// Sync orchestration configuration
    #[serde(default)]
    pub sync: SyncConfig,
}

impl RuntimeConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no runtime config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: RuntimeConfig = serde_yaml_ng::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "loaded runtime config");
        Ok(config)
    }
}

/// Network and HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// HTTP timeout in seconds for check and report calls
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Download timeout in seconds for a single transfer attempt
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            download_timeout_secs: default_download_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}
fn default_download_timeout() -> u64 {
    300 // 5 minutes
}
fn default_user_agent() -> String {
    format!(
        "airlift/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Telemetry reporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    /// Whether event reporting is enabled at all
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    /// Number of queued events that triggers a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Hard cap on the queue length
    #[serde(default = "default_queue_cap")]
    pub max_queue_len: usize,

    /// Persist the queue after every Nth appended event
    #[serde(default = "default_persist_every")]
    pub persist_every: usize,

    /// Periodic flush interval in seconds
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            batch_size: default_batch_size(),
            max_queue_len: default_queue_cap(),
            persist_every: default_persist_every(),
            flush_interval_secs: default_flush_interval(),
        }
    }
}

fn default_telemetry_enabled() -> bool {
    true
}
fn default_batch_size() -> usize {
    10
}
fn default_queue_cap() -> usize {
    100
}
fn default_persist_every() -> usize {
    5
}
fn default_flush_interval() -> u64 {
    60
}

/// Rollback watchdog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RollbackConfig {
    /// Watchdog window in minutes when the install does not specify one
    #[serde(default = "default_rollback_window")]
    pub default_window_mins: u64,

    /// Maximum install/rollback cycles before a package is marked poisoned
    #[serde(default = "default_rollback_retries")]
    pub max_retries: u32,

    /// Failed-update hash expiry window in days
    #[serde(default = "default_failed_expiry")]
    pub failed_update_expiry_days: u64,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            default_window_mins: default_rollback_window(),
            max_retries: default_rollback_retries(),
            failed_update_expiry_days: default_failed_expiry(),
        }
    }
}

fn default_rollback_window() -> u64 {
    5
}
fn default_rollback_retries() -> u32 {
    3
}
fn default_failed_expiry() -> u64 {
    7
}

/// Sync orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Overall sync deadline in milliseconds; zero disables the deadline
    #[serde(default = "default_sync_timeout")]
    pub timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_sync_timeout(),
        }
    }
}

fn default_sync_timeout() -> u64 {
    300_000 // 5 minutes
}
