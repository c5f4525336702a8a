//! Filesystem store implementations
//!
//! State lives as plain JSON files under a root directory the host owns:
//!
//! ```text
//! <root>/current.json      <root>/failed.json     <root>/history.json
//! <root>/pending.json      <root>/rollback.json   <root>/telemetry.json
//! <root>/packages/<hash>.bundle
//! ```
//!
//! Writes go through a temp file plus rename so a crash mid-write never
//! leaves a torn JSON document behind.

use airlift_core::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::metrics::MetricEvent;
use crate::package::PackageDescriptor;
use crate::rollback::RollbackMetadata;

use super::{push_failed, push_history, FailedUpdate, PackageStore, TelemetryStore};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    match serde_json::from_str(&contents) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "discarding corrupt state file");
            Ok(None)
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents =
        serde_json::to_string_pretty(value).map_err(|e| airlift_core::Error::update(format!(
            "failed to serialize state for {}: {e}",
            path.display()
        )))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// JSON-file-backed [`PackageStore`]
pub struct FilePackageStore {
    root: PathBuf,
    failed_expiry: Duration,
}

impl FilePackageStore {
    /// Open (creating if needed) a store rooted at `root` with the default
    /// 7-day failed-update expiry
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_failed_expiry(root, Duration::from_secs(7 * 24 * 3600))
    }

    /// Open a store with a custom failed-update expiry window
    pub fn with_failed_expiry(root: impl Into<PathBuf>, failed_expiry: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("packages"))?;
        Ok(Self { root, failed_expiry })
    }

    fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn package_file(&self, package_hash: &str) -> PathBuf {
        self.root.join("packages").join(format!("{package_hash}.bundle"))
    }
}

impl PackageStore for FilePackageStore {
    fn get_current(&self) -> Result<Option<PackageDescriptor>> {
        read_json(&self.file("current.json"))
    }

    fn set_current(&self, package: &PackageDescriptor) -> Result<()> {
        write_json(&self.file("current.json"), package)
    }

    fn get_pending(&self) -> Result<Option<PackageDescriptor>> {
        read_json(&self.file("pending.json"))
    }

    fn set_pending(&self, package: &PackageDescriptor) -> Result<()> {
        write_json(&self.file("pending.json"), package)
    }

    fn clear_pending(&self) -> Result<()> {
        remove_if_exists(&self.file("pending.json"))
    }

    fn get_failed_updates(&self) -> Result<Vec<FailedUpdate>> {
        let mut failed: Vec<FailedUpdate> =
            read_json(&self.file("failed.json"))?.unwrap_or_default();
        let before = failed.len();
        failed.retain(|f| !f.is_expired(self.failed_expiry));
        if failed.len() != before {
            write_json(&self.file("failed.json"), &failed)?;
        }
        Ok(failed)
    }

    fn mark_failed(&self, package_hash: &str) -> Result<()> {
        let mut failed = self.get_failed_updates()?;
        push_failed(&mut failed, package_hash);
        write_json(&self.file("failed.json"), &failed)
    }

    fn set_failed_updates(&self, failed: &[FailedUpdate]) -> Result<()> {
        write_json(&self.file("failed.json"), &failed.to_vec())
    }

    fn clear_failed_updates(&self) -> Result<()> {
        remove_if_exists(&self.file("failed.json"))
    }

    fn get_rollback_metadata(&self) -> Result<Option<RollbackMetadata>> {
        read_json(&self.file("rollback.json"))
    }

    fn set_rollback_metadata(&self, metadata: &RollbackMetadata) -> Result<()> {
        write_json(&self.file("rollback.json"), metadata)
    }

    fn clear_rollback_metadata(&self) -> Result<()> {
        remove_if_exists(&self.file("rollback.json"))
    }

    fn add_to_history(&self, package: &PackageDescriptor) -> Result<()> {
        let mut history: Vec<PackageDescriptor> =
            read_json(&self.file("history.json"))?.unwrap_or_default();
        push_history(&mut history, package);
        write_json(&self.file("history.json"), &history)
    }

    fn get_by_hash(&self, package_hash: &str) -> Result<Option<PackageDescriptor>> {
        let history: Vec<PackageDescriptor> =
            read_json(&self.file("history.json"))?.unwrap_or_default();
        Ok(history.into_iter().find(|p| p.hash == package_hash))
    }

    fn get_package_data(&self, package_hash: &str) -> Result<Option<Vec<u8>>> {
        let path = self.package_file(package_hash);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    fn set_package_data(&self, package_hash: &str, data: &[u8]) -> Result<()> {
        let path = self.package_file(package_hash);
        let tmp = path.with_extension("bundle.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn delete_package_data(&self, package_hash: &str) -> Result<()> {
        remove_if_exists(&self.package_file(package_hash))
    }
}

/// JSON-file-backed [`TelemetryStore`]
pub struct FileTelemetryStore {
    path: PathBuf,
}

impl FileTelemetryStore {
    /// Persist the telemetry queue under `root/telemetry.json`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            path: root.join("telemetry.json"),
        })
    }
}

impl TelemetryStore for FileTelemetryStore {
    fn load_events(&self) -> Result<Vec<MetricEvent>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    fn save_events(&self, events: &[MetricEvent]) -> Result<()> {
        write_json(&self.path, &events.to_vec())
    }

    fn clear_events(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}
