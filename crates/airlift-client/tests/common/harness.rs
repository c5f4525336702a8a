//! Fully wired coordinator for integration tests

use airlift_client::{
    ClientConfig, DownloadQueue, MemoryPackageStore, MemoryTelemetryStore, MetricsReporter,
    RollbackManager, SyncCoordinator,
};
use airlift_core::config::{RollbackConfig, SyncConfig, TelemetryConfig};
use airlift_core::retry::{BackoffPolicy, BackoffStrategy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use super::constants::*;
use super::fakes::{FakeSink, FakeTransport, FakeUpdateClient};

/// Everything a test needs: the coordinator plus handles into its fakes
pub struct Harness {
    pub coordinator: Arc<SyncCoordinator>,
    pub store: Arc<MemoryPackageStore>,
    pub telemetry_store: Arc<MemoryTelemetryStore>,
    pub rollback: Arc<RollbackManager>,
    pub metrics: MetricsReporter,
    pub queue: DownloadQueue,
    pub client: Arc<FakeUpdateClient>,
    pub transport: Arc<FakeTransport>,
    pub sink: Arc<FakeSink>,
    pub restarts: Arc<AtomicU32>,
    pub download_dir: TempDir,
}

impl Harness {
    /// Number of restarts the coordinator triggered
    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

/// Builder for the harness
pub struct HarnessBuilder {
    client: FakeUpdateClient,
    transport: FakeTransport,
    sink: FakeSink,
    running_package_hash: Option<String>,
    rollback_config: RollbackConfig,
    telemetry_config: TelemetryConfig,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            client: FakeUpdateClient::up_to_date(),
            transport: FakeTransport::serving(BUNDLE_CONTENT),
            sink: FakeSink::new(),
            running_package_hash: None,
            rollback_config: RollbackConfig::default(),
            telemetry_config: TelemetryConfig::default(),
        }
    }

    pub fn client(mut self, client: FakeUpdateClient) -> Self {
        self.client = client;
        self
    }

    pub fn transport(mut self, transport: FakeTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn sink(mut self, sink: FakeSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn running_package(mut self, hash: &str) -> Self {
        self.running_package_hash = Some(hash.to_string());
        self
    }

    pub fn rollback_config(mut self, config: RollbackConfig) -> Self {
        self.rollback_config = config;
        self
    }

    pub fn telemetry_config(mut self, config: TelemetryConfig) -> Self {
        self.telemetry_config = config;
        self
    }

    pub fn build(self) -> Harness {
        let download_dir = TempDir::new().expect("tempdir");

        let mut config = ClientConfig::new(SERVER_URL, DEPLOYMENT_KEY, APP_VERSION);
        config.running_package_hash = self.running_package_hash;

        let store = Arc::new(MemoryPackageStore::new());
        let telemetry_store = Arc::new(MemoryTelemetryStore::new());
        let sink = Arc::new(self.sink);
        let metrics = MetricsReporter::new(
            self.telemetry_config,
            sink.clone(),
            telemetry_store.clone(),
        );

        let rollback = Arc::new(RollbackManager::new(
            store.clone(),
            metrics.clone(),
            config.clone(),
            self.rollback_config,
        ));

        let transport = Arc::new(self.transport);
        let queue = DownloadQueue::new(
            transport.clone(),
            fast_retry_policy(),
            download_dir.path(),
        );

        let client = Arc::new(self.client);

        let restarts = Arc::new(AtomicU32::new(0));
        let restarts_clone = restarts.clone();

        let coordinator = Arc::new(
            SyncCoordinator::new(
                config,
                SyncConfig::default(),
                client.clone(),
                queue.clone(),
                store.clone(),
                rollback.clone(),
                metrics.clone(),
            )
            .with_restart_trigger(Arc::new(move || {
                restarts_clone.fetch_add(1, Ordering::SeqCst);
            })),
        );

        Harness {
            coordinator,
            store,
            telemetry_store,
            rollback,
            metrics,
            queue,
            client,
            transport,
            sink,
            restarts,
            download_dir,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry policy with millisecond delays so tests stay fast
pub fn fast_retry_policy() -> BackoffPolicy {
    BackoffPolicy {
        max_attempts: 3,
        strategy: BackoffStrategy::Fixed,
        base_delay_ms: 1,
        max_delay_ms: 5,
        multiplier: 2.0,
    }
}
