//! Sync orchestration
//!
//! `sync()` composes the whole lifecycle: check for an update, gate on user
//! confirmation, download through the queue, install pending restart, arm
//! the rollback watchdog, and report telemetry. One sync per coordinator
//! instance runs at a time; concurrent callers get `SyncInProgress` back
//! immediately and nothing is queued.

use airlift_core::config::SyncConfig;
use airlift_core::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::client::UpdateClient;
use crate::config::ClientConfig;
use crate::metrics::{DeployStatus, MetricEvent, MetricKind, MetricsReporter};
use crate::package::{InstallMode, LocalUpdate, RemoteUpdate, SyncStatus, UpdateState};
use crate::queue::DownloadQueue;
use crate::restart::RestartGate;
use crate::rollback::RollbackManager;
use crate::store::PackageStore;
use crate::transport::ProgressFn;

/// Presents an offered update to the user
#[async_trait]
pub trait UpdateDialog: Send + Sync {
    /// Ask the user to accept the update
    ///
    /// For mandatory updates the dialog is informational; the return value
    /// is ignored and installation proceeds regardless.
    async fn confirm(&self, update: &RemoteUpdate, mandatory: bool) -> bool;
}

/// Options for one `sync()` run
#[derive(Clone)]
pub struct SyncOptions {
    /// When an optional update takes effect
    pub install_mode: InstallMode,

    /// When a mandatory update takes effect
    pub mandatory_install_mode: InstallMode,

    /// Minimum background time before a resume-mode install applies, seconds
    pub minimum_background_duration_secs: u64,

    /// Skip updates whose hash is in the failed list
    pub ignore_failed_updates: bool,

    /// Confirmation dialog; `None` installs without asking
    pub dialog: Option<Arc<dyn UpdateDialog>>,

    /// Overall deadline override; `None` uses the configured default and
    /// `Some(Duration::ZERO)` disables the deadline
    pub timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            install_mode: InstallMode::OnNextRestart,
            mandatory_install_mode: InstallMode::Immediate,
            minimum_background_duration_secs: 0,
            ignore_failed_updates: true,
            dialog: None,
            timeout: None,
        }
    }
}

/// Status callback
pub type StatusFn = Box<dyn Fn(SyncStatus) + Send + Sync>;

/// Binary-mismatch callback, invoked with the package the service offered
pub type MismatchFn = Box<dyn Fn(&RemoteUpdate) + Send + Sync>;

/// Optional per-sync callbacks
#[derive(Default)]
pub struct SyncHooks {
    /// Receives every state transition
    pub status: Option<StatusFn>,

    /// Receives download progress
    pub progress: Option<ProgressFn>,

    /// Invoked when the service signals the host binary must be upgraded
    pub binary_mismatch: Option<MismatchFn>,
}

/// Releases the single-flight guard on every exit path
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Top-level update orchestrator
///
/// Constructed once by the host's composition root with its collaborators
/// injected; holds no global state.
pub struct SyncCoordinator {
    config: ClientConfig,
    sync_config: SyncConfig,
    client: Arc<dyn UpdateClient>,
    queue: DownloadQueue,
    store: Arc<dyn PackageStore>,
    rollback: Arc<RollbackManager>,
    metrics: MetricsReporter,
    gate: Arc<RestartGate>,
    restart_trigger: Arc<dyn Fn() + Send + Sync>,
    in_flight: AtomicBool,
    app_ready: AtomicBool,
}

impl SyncCoordinator {
    /// Wire up a coordinator from its collaborators
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ClientConfig,
        sync_config: SyncConfig,
        client: Arc<dyn UpdateClient>,
        queue: DownloadQueue,
        store: Arc<dyn PackageStore>,
        rollback: Arc<RollbackManager>,
        metrics: MetricsReporter,
    ) -> Self {
        Self {
            config,
            sync_config,
            client,
            queue,
            store,
            rollback,
            metrics,
            gate: Arc::new(RestartGate::new()),
            restart_trigger: Arc::new(|| {
                warn!("restart requested but no restart trigger is wired");
            }),
            in_flight: AtomicBool::new(false),
            app_ready: AtomicBool::new(false),
        }
    }

    /// Inject the host's restart trigger
    pub fn with_restart_trigger(mut self, trigger: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.restart_trigger = trigger;
        self
    }

    /// Share a restart gate owned by the host
    pub fn with_restart_gate(mut self, gate: Arc<RestartGate>) -> Self {
        self.gate = gate;
        self
    }

    /// The restart gate restarts flow through
    pub fn restart_gate(&self) -> &Arc<RestartGate> {
        &self.gate
    }

    /// Run one update cycle
    ///
    /// Returns the terminal status. The only error this surfaces is the
    /// overall deadline expiring; every other internal failure is logged and
    /// mapped to [`SyncStatus::UnknownError`].
    pub async fn sync(&self, options: SyncOptions, hooks: SyncHooks) -> Result<SyncStatus> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("sync already in progress");
            emit(&hooks, SyncStatus::SyncInProgress);
            return Ok(SyncStatus::SyncInProgress);
        }
        let _guard = FlightGuard(&self.in_flight);

        let timeout = options
            .timeout
            .unwrap_or_else(|| Duration::from_millis(self.sync_config.timeout_ms));

        let run = self.run_sync(&options, &hooks);
        let result = if timeout.is_zero() {
            run.await
        } else {
            match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_secs = timeout.as_secs(), "sync deadline expired");
                    return Err(Error::timeout(timeout));
                }
            }
        };

        match result {
            Ok(status) => Ok(status),
            Err(e) => {
                error!(error = %e, "sync failed");
                emit(&hooks, SyncStatus::UnknownError);
                Ok(SyncStatus::UnknownError)
            }
        }
    }

    async fn run_sync(&self, options: &SyncOptions, hooks: &SyncHooks) -> Result<SyncStatus> {
        emit(hooks, SyncStatus::CheckingForUpdate);

        let current_hash = self
            .store
            .get_current()?
            .map(|p| p.hash)
            .or_else(|| self.config.running_package_hash.clone());

        let check = self.client.check_for_update(current_hash.as_deref()).await?;

        // The app survived long enough to complete a check
        self.notify_app_ready();
        self.metrics.report_event(self.event(MetricKind::Check));

        if check.binary_version_mismatch {
            info!("service requires a newer host binary, skipping update");
            if let (Some(callback), Some(update)) = (&hooks.binary_mismatch, &check.update) {
                callback(update);
            }
            emit(hooks, SyncStatus::UpToDate);
            return Ok(SyncStatus::UpToDate);
        }

        let Some(update) = check.update else {
            debug!("already up to date");
            emit(hooks, SyncStatus::UpToDate);
            return Ok(SyncStatus::UpToDate);
        };

        if options.ignore_failed_updates && self.store.is_failed(update.hash())? {
            info!(hash = %update.hash(), "update previously failed, ignoring");
            emit(hooks, SyncStatus::UpdateIgnored);
            return Ok(SyncStatus::UpdateIgnored);
        }

        let mandatory = update.descriptor.mandatory;
        if let Some(dialog) = &options.dialog {
            emit(hooks, SyncStatus::AwaitingUserAction);
            let accepted = dialog.confirm(&update, mandatory).await;
            if !mandatory && !accepted {
                info!(hash = %update.hash(), "update declined by the user");
                emit(hooks, SyncStatus::UpdateIgnored);
                return Ok(SyncStatus::UpdateIgnored);
            }
        }

        emit(hooks, SyncStatus::DownloadingPackage);
        let handle = self.queue.enqueue(update.clone(), hooks.progress.clone());
        let local = handle.wait().await?;
        self.metrics.report_event(
            self.event(MetricKind::Download)
                .with_package(&local.descriptor.hash, &local.descriptor.label),
        );

        emit(hooks, SyncStatus::InstallingUpdate);
        let mode = if mandatory {
            options.mandatory_install_mode
        } else {
            options.install_mode
        };
        self.install_update(&local, mode, options.minimum_background_duration_secs)?;

        emit(hooks, SyncStatus::UpdateInstalled);
        Ok(SyncStatus::UpdateInstalled)
    }

    /// Install a downloaded package pending restart
    ///
    /// Stores the bundle bytes, sets the package pending, records history,
    /// arms the rollback watchdog, and reports the install. `Immediate` mode
    /// additionally requests a restart through the gate.
    pub fn install_update(
        &self,
        local: &LocalUpdate,
        mode: InstallMode,
        minimum_background_duration_secs: u64,
    ) -> Result<()> {
        let bytes = std::fs::read(&local.bundle_path)
            .map_err(|e| Error::update(format!("bundle unreadable at install: {e}")))?;

        let previous = self.store.get_current()?;

        self.store.set_package_data(&local.descriptor.hash, &bytes)?;
        self.store.set_pending(&local.descriptor)?;
        self.store.add_to_history(&local.descriptor)?;
        self.rollback
            .start_rollback_timer(&local.descriptor.hash, None)?;

        self.metrics.report_event(
            self.event(MetricKind::Install)
                .with_package(&local.descriptor.hash, &local.descriptor.label)
                .with_status(DeployStatus::DeploymentSucceeded)
                .with_previous(
                    previous.as_ref().map(|p| p.label.clone()),
                    previous.as_ref().map(|p| p.deployment_key.clone()),
                ),
        );

        info!(
            hash = %local.descriptor.hash,
            label = %local.descriptor.label,
            ?mode,
            minimum_background_duration_secs,
            verified = local.verified,
            "update installed pending restart"
        );

        if mode == InstallMode::Immediate {
            self.restart_app(false)?;
        }
        Ok(())
    }

    /// Confirm the running package is healthy
    ///
    /// Idempotent: the underlying work runs at most once per instance
    /// lifetime. Disarms the rollback watchdog, promotes the pending package
    /// when it is the one running, and removes the running hash from the
    /// failed list. Never returns an error; callers invoke this
    /// unconditionally at startup.
    pub fn notify_app_ready(&self) {
        if self.app_ready.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("app confirmed ready");
        if let Err(e) = self.app_ready_inner() {
            // Bookkeeping must never take the host down
            warn!(error = %e, "app-ready bookkeeping failed");
        }
    }

    fn app_ready_inner(&self) -> Result<()> {
        self.rollback.cancel_timer()?;

        let running = self.config.running_package_hash.clone();

        if let Some(running) = &running {
            if let Some(pending) = self.store.get_pending()? {
                if pending.hash == *running {
                    info!(hash = %pending.hash, "pending package confirmed, promoting to current");
                    self.store.set_current(&pending)?;
                    self.store.clear_pending()?;
                }
            }

            let failed = self.store.get_failed_updates()?;
            if failed.iter().any(|f| f.package_hash == *running) {
                let remaining: Vec<_> = failed
                    .into_iter()
                    .filter(|f| f.package_hash != *running)
                    .collect();
                self.store.set_failed_updates(&remaining)?;
            }
        }

        let mut event = self
            .event(MetricKind::AppReady)
            .with_status(DeployStatus::DeploymentSucceeded);
        if let Some(running) = running {
            event.package_hash = Some(running);
        }
        self.metrics.report_event(event);
        Ok(())
    }

    /// Request an app restart through the deferral gate
    ///
    /// With `only_if_pending`, a missing pending package makes this a no-op.
    /// Returns whether a restart was requested.
    pub fn restart_app(&self, only_if_pending: bool) -> Result<bool> {
        if only_if_pending && self.store.get_pending()?.is_none() {
            debug!("no pending package, restart skipped");
            return Ok(false);
        }

        let trigger = self.restart_trigger.clone();
        let ran = self.gate.request(Box::new(move || trigger()));
        debug!(ran_immediately = ran, "restart requested");
        Ok(true)
    }

    /// Coarse lifecycle summary for host diagnostics
    pub fn update_state(&self) -> Result<UpdateState> {
        if self.store.get_pending()?.is_some() {
            return Ok(UpdateState::PendingRestart);
        }
        if let Some(running) = &self.config.running_package_hash {
            if self.store.is_failed(running)? {
                return Ok(UpdateState::RolledBack);
            }
        }
        Ok(UpdateState::UpToDate)
    }

    /// Whether `notify_app_ready` has taken effect on this instance
    pub fn app_ready_called(&self) -> bool {
        self.app_ready.load(Ordering::SeqCst)
    }

    fn event(&self, kind: MetricKind) -> MetricEvent {
        MetricEvent::new(
            kind,
            self.config.client_id.clone(),
            self.config.deployment_key.clone(),
            self.config.app_version.clone(),
        )
    }
}

fn emit(hooks: &SyncHooks, status: SyncStatus) {
    if let Some(callback) = &hooks.status {
        callback(status);
    }
}
