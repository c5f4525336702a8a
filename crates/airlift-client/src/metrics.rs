//! Batched, persisted lifecycle telemetry
//!
//! Events are appended to a bounded in-memory queue, periodically persisted
//! so a crash loses at most a handful of events, and flushed in batches to
//! two logically distinct endpoints: download lifecycle events go to the
//! download-status endpoint, install/rollback/app-ready transitions to the
//! deploy-status endpoint. Telemetry must never crash the host, so every
//! failure here is logged and swallowed by the callers.

use airlift_core::config::TelemetryConfig;
use airlift_core::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::store::TelemetryStore;

/// Lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    /// An update check completed
    Check,

    /// A bundle download completed
    Download,

    /// A package was installed pending restart
    Install,

    /// The watchdog reverted a package
    Rollback,

    /// The app confirmed readiness after launch
    AppReady,
}

impl MetricKind {
    /// Which reporting endpoint this kind belongs to
    pub fn endpoint(&self) -> Endpoint {
        match self {
            MetricKind::Download => Endpoint::DownloadStatus,
            MetricKind::Check
            | MetricKind::Install
            | MetricKind::Rollback
            | MetricKind::AppReady => Endpoint::DeployStatus,
        }
    }
}

/// The two reporting endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Download lifecycle reporting
    DownloadStatus,

    /// Deployment transition reporting
    DeployStatus,
}

/// Deployment outcome carried on deploy-status events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStatus {
    DeploymentSucceeded,
    DeploymentFailed,
}

/// One recorded lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Event kind; decides the endpoint and field mapping
    pub kind: MetricKind,

    /// Anonymous client identifier
    pub client_id: String,

    /// Deployment the event belongs to
    pub deployment_key: String,

    /// Host binary version
    pub app_version: String,

    /// Package content hash, when the event concerns one package
    pub package_hash: Option<String>,

    /// Release label
    pub label: Option<String>,

    /// Epoch milliseconds at record time
    pub timestamp: i64,

    /// Deployment outcome for deploy-status transitions
    pub status: Option<DeployStatus>,

    /// Label the client ran before this transition
    pub previous_label: Option<String>,

    /// Deployment key the client followed before this transition
    pub previous_deployment_key: Option<String>,
}

impl MetricEvent {
    /// Create an event stamped with the current time
    pub fn new(
        kind: MetricKind,
        client_id: impl Into<String>,
        deployment_key: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            client_id: client_id.into(),
            deployment_key: deployment_key.into(),
            app_version: app_version.into(),
            package_hash: None,
            label: None,
            timestamp: Utc::now().timestamp_millis(),
            status: None,
            previous_label: None,
            previous_deployment_key: None,
        }
    }

    /// Attach a package hash and label
    pub fn with_package(mut self, hash: impl Into<String>, label: impl Into<String>) -> Self {
        self.package_hash = Some(hash.into());
        self.label = Some(label.into());
        self
    }

    /// Attach a deployment outcome
    pub fn with_status(mut self, status: DeployStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the previous deployment position
    pub fn with_previous(
        mut self,
        label: Option<String>,
        deployment_key: Option<String>,
    ) -> Self {
        self.previous_label = label;
        self.previous_deployment_key = deployment_key;
        self
    }
}

/// Wire body for the download-status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadStatusBody {
    pub client_unique_id: String,
    pub deployment_key: String,
    pub label: String,
}

/// Wire body for the deploy-status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployStatusBody {
    pub app_version: String,
    pub deployment_key: String,
    pub client_unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_label_or_app_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_deployment_key: Option<String>,
}

impl DownloadStatusBody {
    fn from_event(event: &MetricEvent) -> Self {
        Self {
            client_unique_id: event.client_id.clone(),
            deployment_key: event.deployment_key.clone(),
            label: event.label.clone().unwrap_or_default(),
        }
    }
}

impl DeployStatusBody {
    fn from_event(event: &MetricEvent) -> Self {
        Self {
            app_version: event.app_version.clone(),
            deployment_key: event.deployment_key.clone(),
            client_unique_id: event.client_id.clone(),
            label: event.label.clone(),
            status: event.status.map(|s| {
                match s {
                    DeployStatus::DeploymentSucceeded => "DeploymentSucceeded",
                    DeployStatus::DeploymentFailed => "DeploymentFailed",
                }
                .to_string()
            }),
            previous_label_or_app_version: event.previous_label.clone(),
            previous_deployment_key: event.previous_deployment_key.clone(),
        }
    }
}

/// Delivers metric bodies to the reporting endpoints
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Send one download-status body
    async fn send_download_status(&self, body: &DownloadStatusBody) -> Result<()>;

    /// Send one deploy-status body
    async fn send_deploy_status(&self, body: &DeployStatusBody) -> Result<()>;
}

/// HTTP implementation of [`MetricsSink`]
pub struct HttpMetricsSink {
    client: reqwest::Client,
    server_url: String,
}

impl HttpMetricsSink {
    /// Create a sink posting to the deployment service
    pub fn new(server_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(timeout)
                .build()
                .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?,
            server_url: server_url.into(),
        })
    }

    /// Create a sink using the runtime network configuration
    pub fn from_network(
        server_url: impl Into<String>,
        network: &airlift_core::config::NetworkConfig,
    ) -> Result<Self> {
        Self::new(
            server_url,
            &network.user_agent,
            Duration::from_secs(network.http_timeout_secs),
        )
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.server_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::network(format!("status report failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "status report rejected with {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for HttpMetricsSink {
    async fn send_download_status(&self, body: &DownloadStatusBody) -> Result<()> {
        self.post("/v1/report_status/download", body).await
    }

    async fn send_deploy_status(&self, body: &DeployStatusBody) -> Result<()> {
        self.post("/v1/report_status/deploy", body).await
    }
}

struct ReporterInner {
    config: TelemetryConfig,
    sink: Arc<dyn MetricsSink>,
    store: Arc<dyn TelemetryStore>,
    queue: Mutex<VecDeque<MetricEvent>>,
    appended: AtomicUsize,
    flushing: AtomicBool,
}

/// Records lifecycle events and flushes them in batches
///
/// Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct MetricsReporter {
    inner: Arc<ReporterInner>,
}

impl MetricsReporter {
    /// Create a reporter over the given sink and persistence store
    pub fn new(
        config: TelemetryConfig,
        sink: Arc<dyn MetricsSink>,
        store: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                config,
                sink,
                store,
                queue: Mutex::new(VecDeque::new()),
                appended: AtomicUsize::new(0),
                flushing: AtomicBool::new(false),
            }),
        }
    }

    /// Recover events persisted by a prior session
    ///
    /// Recovered events are prepended ahead of anything already queued, then
    /// the persisted copy is deleted. Call once at process start.
    pub fn recover(&self) {
        let recovered = match self.inner.store.load_events() {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "failed to load persisted telemetry");
                return;
            }
        };
        if recovered.is_empty() {
            return;
        }

        debug!(count = recovered.len(), "recovered persisted telemetry");
        {
            let mut queue = self.inner.queue.lock().unwrap();
            for event in recovered.into_iter().rev() {
                queue.push_front(event);
            }
            queue.truncate(self.inner.config.max_queue_len);
        }
        if let Err(e) = self.inner.store.clear_events() {
            warn!(error = %e, "failed to clear persisted telemetry");
        }
    }

    /// Record one lifecycle event
    ///
    /// No-op when reporting is disabled. Every Nth append persists the queue
    /// and a full batch triggers an asynchronous flush.
    pub fn report_event(&self, event: MetricEvent) {
        if !self.inner.config.enabled {
            return;
        }

        let should_flush;
        {
            let mut queue = self.inner.queue.lock().unwrap();
            if queue.len() >= self.inner.config.max_queue_len {
                warn!(kind = ?event.kind, "telemetry queue full, dropping event");
                return;
            }
            queue.push_back(event);
            should_flush = queue.len() >= self.inner.config.batch_size;
        }

        let appended = self.inner.appended.fetch_add(1, Ordering::SeqCst) + 1;
        let persist_every = self.inner.config.persist_every;
        if persist_every > 0 && appended % persist_every == 0 {
            self.persist_async();
        }

        if should_flush {
            let reporter = self.clone();
            tokio::spawn(async move {
                if let Err(e) = reporter.flush().await {
                    warn!(error = %e, "telemetry flush failed");
                }
            });
        }
    }

    fn persist_async(&self) {
        let snapshot: Vec<MetricEvent> = {
            let queue = self.inner.queue.lock().unwrap();
            queue.iter().cloned().collect()
        };
        let store = self.inner.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.save_events(&snapshot) {
                warn!(error = %e, "failed to persist telemetry queue");
            }
        });
    }

    /// Flush up to one batch of queued events
    ///
    /// Reentrancy-guarded: a flush already in progress makes this a no-op.
    /// Events that fail to send are re-queued within the queue cap; a fully
    /// delivered batch clears the persisted copy.
    pub async fn flush(&self) -> Result<()> {
        if self.inner.flushing.swap(true, Ordering::SeqCst) {
            debug!("flush already in progress");
            return Ok(());
        }

        let result = self.flush_locked().await;
        self.inner.flushing.store(false, Ordering::SeqCst);
        result
    }

    async fn flush_locked(&self) -> Result<()> {
        let batch: Vec<MetricEvent> = {
            let mut queue = self.inner.queue.lock().unwrap();
            let take = queue.len().min(self.inner.config.batch_size);
            queue.drain(..take).collect()
        };

        if batch.is_empty() {
            return Ok(());
        }

        debug!(count = batch.len(), "flushing telemetry batch");

        let mut all_sent = true;
        for event in batch {
            let sent = match event.kind.endpoint() {
                Endpoint::DownloadStatus => {
                    self.inner
                        .sink
                        .send_download_status(&DownloadStatusBody::from_event(&event))
                        .await
                }
                Endpoint::DeployStatus => {
                    self.inner
                        .sink
                        .send_deploy_status(&DeployStatusBody::from_event(&event))
                        .await
                }
            };

            if let Err(e) = sent {
                warn!(kind = ?event.kind, error = %e, "event send failed, re-queueing");
                all_sent = false;
                let mut queue = self.inner.queue.lock().unwrap();
                if queue.len() < self.inner.config.max_queue_len {
                    queue.push_back(event);
                }
            }
        }

        if all_sent {
            if let Err(e) = self.inner.store.clear_events() {
                warn!(error = %e, "failed to clear persisted telemetry");
            }
        }
        Ok(())
    }

    /// Spawn the periodic flush task
    ///
    /// Returns the task handle; abort it to stop periodic flushing.
    pub fn start_periodic_flush(&self) -> tokio::task::JoinHandle<()> {
        let reporter = self.clone();
        let interval = Duration::from_secs(self.inner.config.flush_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = reporter.flush().await {
                    warn!(error = %e, "periodic telemetry flush failed");
                }
            }
        })
    }

    /// Number of events currently queued
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }
}
