//! Rollback watchdog
//!
//! Every install arms a watchdog timer. If the app does not confirm
//! readiness before the timer fires, the installed package is presumed
//! broken: it is marked failed and the previous package is promoted back to
//! current. The armed state is persisted so the watchdog survives the exact
//! failure it guards against - an update that kills the process also kills
//! any in-memory timer.

use airlift_core::config::RollbackConfig;
use airlift_core::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::metrics::{DeployStatus, MetricEvent, MetricKind, MetricsReporter};
use crate::store::PackageStore;

/// Persisted watchdog state for one installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// Hash of the installed package under watch
    pub package_hash: String,

    /// Hash of the package to revert to
    pub previous_hash: Option<String>,

    /// Epoch milliseconds when the package was installed
    pub installed_at: i64,

    /// Watchdog window in milliseconds
    pub timeout_ms: u64,

    /// Install/rollback cycles allowed before the package is poisoned
    pub max_retries: u32,

    /// Cycles spent so far
    pub retry_count: u32,
}

impl RollbackRecord {
    /// Epoch milliseconds when the watchdog fires
    pub fn deadline(&self) -> i64 {
        self.installed_at.saturating_add(self.timeout_ms as i64)
    }

    /// Whether the retry budget is spent
    pub fn budget_spent(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Persisted watchdog state: at most one armed hash, plus per-hash records
///
/// Records outlive the timer so repeated install/rollback cycles of the same
/// poisoned package accumulate a retry count; only explicit confirmation
/// (`cancel_timer`) deletes a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackMetadata {
    /// Hash whose timer is currently armed
    pub armed: Option<String>,

    /// Watchdog records keyed by package hash
    pub records: HashMap<String, RollbackRecord>,
}

struct ArmedTimer {
    package_hash: String,
    task: tokio::task::JoinHandle<()>,
}

/// Arms, disarms, and fires the rollback watchdog
pub struct RollbackManager {
    store: Arc<dyn PackageStore>,
    metrics: MetricsReporter,
    client: ClientConfig,
    config: RollbackConfig,
    armed: Mutex<Option<ArmedTimer>>,
}

impl RollbackManager {
    /// Create a manager over the given store and reporter
    pub fn new(
        store: Arc<dyn PackageStore>,
        metrics: MetricsReporter,
        client: ClientConfig,
        config: RollbackConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            client,
            config,
            armed: Mutex::new(None),
        }
    }

    fn default_window(&self) -> Duration {
        Duration::from_secs(self.config.default_window_mins * 60)
    }

    /// Arm the watchdog for a freshly installed package
    ///
    /// Cancels any armed timer first. When the hash already has a record
    /// whose retry budget is spent, the package is marked failed immediately
    /// and no timer is armed.
    pub fn start_rollback_timer(
        self: &Arc<Self>,
        installed_hash: &str,
        delay_in_hours: Option<u64>,
    ) -> Result<()> {
        self.disarm();

        let mut metadata = self.store.get_rollback_metadata()?.unwrap_or_default();

        if let Some(record) = metadata.records.get(installed_hash) {
            if record.budget_spent() {
                warn!(
                    hash = %installed_hash,
                    retries = record.retry_count,
                    "retry budget spent, marking package failed without arming"
                );
                self.store.mark_failed(installed_hash)?;
                return Ok(());
            }
        }

        let window = match delay_in_hours {
            Some(hours) if hours > 0 => Duration::from_secs(hours * 3600),
            _ => self.default_window(),
        };

        let retry_count = metadata
            .records
            .get(installed_hash)
            .map(|r| r.retry_count + 1)
            .unwrap_or(0);

        let previous_hash = self.store.get_current()?.map(|p| p.hash);

        let record = RollbackRecord {
            package_hash: installed_hash.to_string(),
            previous_hash,
            installed_at: Utc::now().timestamp_millis(),
            timeout_ms: window.as_millis() as u64,
            max_retries: self.config.max_retries,
            retry_count,
        };

        metadata
            .records
            .insert(installed_hash.to_string(), record);
        metadata.armed = Some(installed_hash.to_string());
        self.store.set_rollback_metadata(&metadata)?;

        self.arm(installed_hash.to_string(), window);
        info!(hash = %installed_hash, window_secs = window.as_secs(), "rollback watchdog armed");
        Ok(())
    }

    /// Disarm the watchdog and delete the armed hash's record
    ///
    /// Called by the successful-launch path once the app confirms readiness.
    pub fn cancel_timer(&self) -> Result<()> {
        let armed_hash = {
            let mut armed = self.armed.lock().unwrap();
            match armed.take() {
                Some(timer) => {
                    timer.task.abort();
                    Some(timer.package_hash)
                }
                None => None,
            }
        };

        let mut metadata = self.store.get_rollback_metadata()?.unwrap_or_default();
        let hash = armed_hash.or_else(|| metadata.armed.clone());

        if let Some(hash) = hash {
            debug!(hash = %hash, "rollback watchdog disarmed");
            metadata.armed = None;
            metadata.records.remove(&hash);
            if metadata.records.is_empty() {
                self.store.clear_rollback_metadata()?;
            } else {
                self.store.set_rollback_metadata(&metadata)?;
            }
        }
        Ok(())
    }

    /// Revert the armed package to its predecessor
    ///
    /// Marks the package failed, promotes the previous package from history
    /// when present, clears pending, and reports a rollback metric. A missing
    /// predecessor is logged and leaves state as-is.
    pub fn perform_rollback(&self, package_hash: &str) {
        if let Err(e) = self.rollback_inner(package_hash) {
            // The safety net must not take the host down with it
            error!(hash = %package_hash, error = %e, "rollback failed");
        }
    }

    fn rollback_inner(&self, package_hash: &str) -> Result<()> {
        let mut metadata = self.store.get_rollback_metadata()?.unwrap_or_default();
        if metadata.armed.as_deref() != Some(package_hash) {
            debug!(hash = %package_hash, "watchdog fired for a hash that is no longer armed");
            return Ok(());
        }

        error!(hash = %package_hash, "package never confirmed readiness, rolling back");

        self.store.mark_failed(package_hash)?;

        let record = metadata.records.get(package_hash).cloned();
        let previous_hash = record.and_then(|r| r.previous_hash);

        match previous_hash.and_then(|hash| self.store.get_by_hash(&hash).transpose()) {
            Some(Ok(previous)) => {
                info!(from = %package_hash, to = %previous.hash, "reverting to previous package");
                self.store.set_current(&previous)?;
                self.store.clear_pending()?;
            }
            Some(Err(e)) => return Err(e),
            None => {
                warn!(hash = %package_hash, "no previous package in history, leaving state as-is");
            }
        }

        // Timer consumed; the record stays so reinstalls keep counting
        metadata.armed = None;
        self.store.set_rollback_metadata(&metadata)?;
        self.armed.lock().unwrap().take();

        let failed_label = self
            .store
            .get_by_hash(package_hash)
            .ok()
            .flatten()
            .map(|p| p.label)
            .unwrap_or_default();
        self.metrics.report_event(
            MetricEvent::new(
                MetricKind::Rollback,
                self.client.client_id.clone(),
                self.client.deployment_key.clone(),
                self.client.app_version.clone(),
            )
            .with_package(package_hash, failed_label)
            .with_status(DeployStatus::DeploymentFailed),
        );
        Ok(())
    }

    /// Resume or fire a watchdog persisted by a prior session
    ///
    /// Run once at process start: an already-elapsed deadline rolls back
    /// immediately, otherwise the timer is re-armed for the remainder.
    pub fn check_pending_rollback(self: &Arc<Self>) -> Result<()> {
        let metadata = self.store.get_rollback_metadata()?.unwrap_or_default();
        let Some(armed_hash) = metadata.armed.clone() else {
            return Ok(());
        };
        let Some(record) = metadata.records.get(&armed_hash) else {
            return Ok(());
        };

        let now = Utc::now().timestamp_millis();
        let remaining_ms = record.deadline().saturating_sub(now);

        if remaining_ms <= 0 {
            info!(hash = %armed_hash, "watchdog deadline elapsed while process was down");
            self.perform_rollback(&armed_hash);
        } else {
            debug!(hash = %armed_hash, remaining_ms, "re-arming watchdog for the remainder");
            self.arm(armed_hash, Duration::from_millis(remaining_ms as u64));
        }
        Ok(())
    }

    /// Hash currently under watch, if any
    pub fn armed_hash(&self) -> Option<String> {
        self.armed
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| t.package_hash.clone())
    }

    fn arm(self: &Arc<Self>, package_hash: String, window: Duration) {
        let manager = Arc::clone(self);
        let hash = package_hash.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            manager.perform_rollback(&hash);
        });

        let mut armed = self.armed.lock().unwrap();
        if let Some(previous) = armed.replace(ArmedTimer { package_hash, task }) {
            previous.task.abort();
        }
    }

    fn disarm(&self) {
        if let Some(timer) = self.armed.lock().unwrap().take() {
            timer.task.abort();
            debug!(hash = %timer.package_hash, "previous watchdog cancelled by new arm");
        }
    }
}
