//! Package model shared across the client
//!
//! A package is one immutable, content-addressed release bundle plus its
//! metadata. The descriptor is uniquely identified by its content hash; the
//! hash is stable across retries of the same release.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable metadata describing one release bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Content hash of the bundle bytes (opaque identifier)
    pub hash: String,

    /// Monotonic release identifier assigned by the deployment service
    pub label: String,

    /// Semver range of host binary versions this bundle targets
    pub target_binary_range: String,

    /// Whether the release must be installed without user opt-out
    pub mandatory: bool,

    /// Bundle size in bytes
    pub size: u64,

    /// Human-readable release description
    pub description: Option<String>,

    /// Deployment the bundle belongs to
    pub deployment_key: String,
}

/// A package offered by the deployment service, with its download location
///
/// Owns no bundle bytes; the queue turns it into a [`LocalUpdate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUpdate {
    /// Release metadata
    pub descriptor: PackageDescriptor,

    /// Signed URL for the full bundle
    pub download_url: String,

    /// Signed URL for a differential patch, when the service produced one
    pub diff_download_url: Option<String>,

    /// Size of the differential patch in bytes
    pub diff_size: Option<u64>,
}

impl RemoteUpdate {
    /// The content hash identifying this update
    pub fn hash(&self) -> &str {
        &self.descriptor.hash
    }
}

/// A downloaded package on local storage, ready to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUpdate {
    /// Release metadata
    pub descriptor: PackageDescriptor,

    /// Where the bundle bytes were written
    pub bundle_path: PathBuf,

    /// Whether the content hash was verified against the downloaded bytes
    ///
    /// `false` means verification was explicitly disabled, not that it
    /// failed; a failed verification rejects the download outright.
    pub verified: bool,
}

/// When an installed update takes effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallMode {
    /// Apply and restart as soon as the install completes
    Immediate,

    /// Apply on the next full restart of the host app
    OnNextRestart,

    /// Apply the next time the host app returns to the foreground
    OnNextResume,

    /// Apply the next time the host app is backgrounded
    OnNextSuspend,
}

/// Status of a sync operation
///
/// Both the terminal result of `sync()` and the intermediate states emitted
/// on the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// The running package is the newest for this deployment
    UpToDate,

    /// A new package was downloaded and installed pending restart
    UpdateInstalled,

    /// The offered package was declined or suppressed
    UpdateIgnored,

    /// An internal failure was caught and mapped; details are in the log
    UnknownError,

    /// Another sync on this instance is still running
    SyncInProgress,

    /// Querying the deployment service
    CheckingForUpdate,

    /// Waiting on the user confirmation dialog
    AwaitingUserAction,

    /// Transferring the bundle
    DownloadingPackage,

    /// Writing the bundle and arming the watchdog
    InstallingUpdate,
}

impl SyncStatus {
    /// Whether this status terminates a sync run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::UpToDate
                | SyncStatus::UpdateInstalled
                | SyncStatus::UpdateIgnored
                | SyncStatus::UnknownError
                | SyncStatus::SyncInProgress
        )
    }
}

/// Coarse summary of the install lifecycle for host diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    /// No pending package and the running package is healthy
    UpToDate,

    /// An installed package is waiting for a restart
    PendingRestart,

    /// The running package was reverted by the watchdog
    RolledBack,
}
