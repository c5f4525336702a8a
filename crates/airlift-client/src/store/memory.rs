//! In-memory store implementations
//!
//! Primarily for tests and hosts that manage durability themselves.

use airlift_core::Result;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::metrics::MetricEvent;
use crate::package::PackageDescriptor;
use crate::rollback::RollbackMetadata;

use super::{push_failed, push_history, FailedUpdate, PackageStore, TelemetryStore};

#[derive(Default)]
struct MemoryState {
    current: Option<PackageDescriptor>,
    pending: Option<PackageDescriptor>,
    failed: Vec<FailedUpdate>,
    rollback: Option<RollbackMetadata>,
    history: Vec<PackageDescriptor>,
    data: HashMap<String, Vec<u8>>,
}

/// In-memory [`PackageStore`]
pub struct MemoryPackageStore {
    state: Mutex<MemoryState>,
    failed_expiry: Duration,
}

impl MemoryPackageStore {
    /// Create an empty store with the default 7-day failed-update expiry
    pub fn new() -> Self {
        Self::with_failed_expiry(Duration::from_secs(7 * 24 * 3600))
    }

    /// Create an empty store with a custom failed-update expiry window
    pub fn with_failed_expiry(failed_expiry: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            failed_expiry,
        }
    }
}

impl Default for MemoryPackageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageStore for MemoryPackageStore {
    fn get_current(&self) -> Result<Option<PackageDescriptor>> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    fn set_current(&self, package: &PackageDescriptor) -> Result<()> {
        self.state.lock().unwrap().current = Some(package.clone());
        Ok(())
    }

    fn get_pending(&self) -> Result<Option<PackageDescriptor>> {
        Ok(self.state.lock().unwrap().pending.clone())
    }

    fn set_pending(&self, package: &PackageDescriptor) -> Result<()> {
        self.state.lock().unwrap().pending = Some(package.clone());
        Ok(())
    }

    fn clear_pending(&self) -> Result<()> {
        self.state.lock().unwrap().pending = None;
        Ok(())
    }

    fn get_failed_updates(&self) -> Result<Vec<FailedUpdate>> {
        let mut state = self.state.lock().unwrap();
        state.failed.retain(|f| !f.is_expired(self.failed_expiry));
        Ok(state.failed.clone())
    }

    fn mark_failed(&self, package_hash: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        push_failed(&mut state.failed, package_hash);
        Ok(())
    }

    fn set_failed_updates(&self, failed: &[FailedUpdate]) -> Result<()> {
        self.state.lock().unwrap().failed = failed.to_vec();
        Ok(())
    }

    fn clear_failed_updates(&self) -> Result<()> {
        self.state.lock().unwrap().failed.clear();
        Ok(())
    }

    fn get_rollback_metadata(&self) -> Result<Option<RollbackMetadata>> {
        Ok(self.state.lock().unwrap().rollback.clone())
    }

    fn set_rollback_metadata(&self, metadata: &RollbackMetadata) -> Result<()> {
        self.state.lock().unwrap().rollback = Some(metadata.clone());
        Ok(())
    }

    fn clear_rollback_metadata(&self) -> Result<()> {
        self.state.lock().unwrap().rollback = None;
        Ok(())
    }

    fn add_to_history(&self, package: &PackageDescriptor) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        push_history(&mut state.history, package);
        Ok(())
    }

    fn get_by_hash(&self, package_hash: &str) -> Result<Option<PackageDescriptor>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .history
            .iter()
            .find(|p| p.hash == package_hash)
            .cloned())
    }

    fn get_package_data(&self, package_hash: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().unwrap().data.get(package_hash).cloned())
    }

    fn set_package_data(&self, package_hash: &str, data: &[u8]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .data
            .insert(package_hash.to_string(), data.to_vec());
        Ok(())
    }

    fn delete_package_data(&self, package_hash: &str) -> Result<()> {
        self.state.lock().unwrap().data.remove(package_hash);
        Ok(())
    }
}

/// In-memory [`TelemetryStore`]
#[derive(Default)]
pub struct MemoryTelemetryStore {
    events: Mutex<Vec<MetricEvent>>,
}

impl MemoryTelemetryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetryStore for MemoryTelemetryStore {
    fn load_events(&self) -> Result<Vec<MetricEvent>> {
        Ok(self.events.lock().unwrap().clone())
    }

    fn save_events(&self, events: &[MetricEvent]) -> Result<()> {
        *self.events.lock().unwrap() = events.to_vec();
        Ok(())
    }

    fn clear_events(&self) -> Result<()> {
        self.events.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(hash: &str) -> PackageDescriptor {
        PackageDescriptor {
            hash: hash.to_string(),
            label: format!("v-{hash}"),
            target_binary_range: "*".to_string(),
            mandatory: false,
            size: 10,
            description: None,
            deployment_key: "dk".to_string(),
        }
    }

    #[test]
    fn test_current_and_pending() {
        let store = MemoryPackageStore::new();
        assert!(store.get_current().unwrap().is_none());

        store.set_current(&descriptor("h1")).unwrap();
        store.set_pending(&descriptor("h2")).unwrap();
        assert_eq!(store.get_current().unwrap().unwrap().hash, "h1");
        assert_eq!(store.get_pending().unwrap().unwrap().hash, "h2");

        store.clear_pending().unwrap();
        assert!(store.get_pending().unwrap().is_none());
    }

    #[test]
    fn test_failed_updates_dedup_and_query() {
        let store = MemoryPackageStore::new();
        store.mark_failed("h1").unwrap();
        store.mark_failed("h1").unwrap();
        store.mark_failed("h2").unwrap();

        assert_eq!(store.get_failed_updates().unwrap().len(), 2);
        assert!(store.is_failed("h1").unwrap());
        assert!(!store.is_failed("h3").unwrap());
    }

    #[test]
    fn test_failed_updates_expire() {
        let store = MemoryPackageStore::with_failed_expiry(Duration::ZERO);
        store.mark_failed("h1").unwrap();
        assert!(store.get_failed_updates().unwrap().is_empty());
        assert!(!store.is_failed("h1").unwrap());
    }

    #[test]
    fn test_history_lookup() {
        let store = MemoryPackageStore::new();
        store.add_to_history(&descriptor("h1")).unwrap();
        store.add_to_history(&descriptor("h2")).unwrap();

        assert_eq!(store.get_by_hash("h1").unwrap().unwrap().hash, "h1");
        assert!(store.get_by_hash("h9").unwrap().is_none());
    }

    #[test]
    fn test_package_data() {
        let store = MemoryPackageStore::new();
        store.set_package_data("h1", b"bytes").unwrap();
        assert_eq!(store.get_package_data("h1").unwrap().unwrap(), b"bytes");

        store.delete_package_data("h1").unwrap();
        assert!(store.get_package_data("h1").unwrap().is_none());
    }

    #[test]
    fn test_telemetry_store_roundtrip() {
        use crate::metrics::MetricKind;

        let store = MemoryTelemetryStore::new();
        assert!(store.load_events().unwrap().is_empty());

        let event = MetricEvent::new(MetricKind::AppReady, "c", "dk", "1.0.0");
        store.save_events(std::slice::from_ref(&event)).unwrap();
        assert_eq!(store.load_events().unwrap(), vec![event]);

        store.clear_events().unwrap();
        assert!(store.load_events().unwrap().is_empty());
    }
}
