//! Durable state behind the update lifecycle
//!
//! The core never touches a concrete storage mechanism; it talks to these
//! traits. [`MemoryPackageStore`] backs tests, [`FilePackageStore`] backs
//! real hosts with plain JSON files.
//!
//! Invariants enforced here: exactly one current and at most one pending
//! package; a hash appears in history at most once with the history capped
//! at three entries; the failed-update list is a deduplicated set whose
//! entries expire after a configurable window.

mod fs;
mod memory;

pub use fs::{FilePackageStore, FileTelemetryStore};
pub use memory::{MemoryPackageStore, MemoryTelemetryStore};

use airlift_core::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::metrics::MetricEvent;
use crate::package::PackageDescriptor;
use crate::rollback::RollbackMetadata;

/// Number of history entries retained
pub const HISTORY_CAP: usize = 3;

/// One entry in the failed-update list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUpdate {
    /// Content hash of the package that failed
    pub package_hash: String,

    /// Epoch milliseconds when the failure was recorded
    pub failed_at: i64,
}

impl FailedUpdate {
    /// Record a failure for the given hash, stamped now
    pub fn now(package_hash: impl Into<String>) -> Self {
        Self {
            package_hash: package_hash.into(),
            failed_at: Utc::now().timestamp_millis(),
        }
    }

    /// Whether this entry is older than the expiry window
    pub fn is_expired(&self, expiry: Duration) -> bool {
        let age_ms = Utc::now().timestamp_millis().saturating_sub(self.failed_at);
        age_ms >= expiry.as_millis() as i64
    }
}

/// Durable record of package metadata and bundle bytes
pub trait PackageStore: Send + Sync {
    /// Package the running app was launched with
    fn get_current(&self) -> Result<Option<PackageDescriptor>>;

    /// Replace the current package
    fn set_current(&self, package: &PackageDescriptor) -> Result<()>;

    /// Installed-but-not-yet-running package
    fn get_pending(&self) -> Result<Option<PackageDescriptor>>;

    /// Set the pending package, replacing any previous one
    fn set_pending(&self, package: &PackageDescriptor) -> Result<()>;

    /// Drop the pending package
    fn clear_pending(&self) -> Result<()>;

    /// Unexpired failed updates
    fn get_failed_updates(&self) -> Result<Vec<FailedUpdate>>;

    /// Add a hash to the failed list, deduplicated
    fn mark_failed(&self, package_hash: &str) -> Result<()>;

    /// Replace the failed list wholesale
    fn set_failed_updates(&self, failed: &[FailedUpdate]) -> Result<()>;

    /// Drop the failed list
    fn clear_failed_updates(&self) -> Result<()>;

    /// Whether a hash is in the unexpired failed list
    fn is_failed(&self, package_hash: &str) -> Result<bool> {
        Ok(self
            .get_failed_updates()?
            .iter()
            .any(|f| f.package_hash == package_hash))
    }

    /// Persisted rollback watchdog state
    fn get_rollback_metadata(&self) -> Result<Option<RollbackMetadata>>;

    /// Replace the rollback watchdog state
    fn set_rollback_metadata(&self, metadata: &RollbackMetadata) -> Result<()>;

    /// Drop the rollback watchdog state
    fn clear_rollback_metadata(&self) -> Result<()>;

    /// Append a package to history, moving a re-installed hash to the
    /// most-recent slot; history keeps at most [`HISTORY_CAP`] entries
    fn add_to_history(&self, package: &PackageDescriptor) -> Result<()>;

    /// Look up a package by hash in history
    fn get_by_hash(&self, package_hash: &str) -> Result<Option<PackageDescriptor>>;

    /// Raw bundle bytes keyed by content hash
    fn get_package_data(&self, package_hash: &str) -> Result<Option<Vec<u8>>>;

    /// Store bundle bytes under their content hash
    fn set_package_data(&self, package_hash: &str, data: &[u8]) -> Result<()>;

    /// Drop bundle bytes for a hash
    fn delete_package_data(&self, package_hash: &str) -> Result<()>;
}

/// Durable copy of the telemetry queue
pub trait TelemetryStore: Send + Sync {
    /// Load events persisted by a prior session
    fn load_events(&self) -> Result<Vec<MetricEvent>>;

    /// Replace the persisted queue copy
    fn save_events(&self, events: &[MetricEvent]) -> Result<()>;

    /// Delete the persisted queue copy
    fn clear_events(&self) -> Result<()>;
}

/// Shared history maintenance used by both store implementations
pub(crate) fn push_history(history: &mut Vec<PackageDescriptor>, package: &PackageDescriptor) {
    history.retain(|p| p.hash != package.hash);
    history.push(package.clone());
    if history.len() > HISTORY_CAP {
        let excess = history.len() - HISTORY_CAP;
        history.drain(..excess);
    }
}

/// Shared failed-list maintenance: dedup on hash, keep the original stamp
pub(crate) fn push_failed(failed: &mut Vec<FailedUpdate>, package_hash: &str) {
    if failed.iter().any(|f| f.package_hash == package_hash) {
        return;
    }
    failed.push(FailedUpdate::now(package_hash));
}
