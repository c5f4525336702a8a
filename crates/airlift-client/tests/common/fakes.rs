//! Scripted fakes for the collaborator traits

use airlift_client::metrics::{DeployStatusBody, DownloadStatusBody};
use airlift_client::{
    CheckResult, MetricsSink, ProgressFn, RemoteUpdate, Transport, TransferOutcome, UpdateClient,
    UpdateDialog,
};
use airlift_core::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Update client replaying scripted responses
///
/// Responses are consumed front to back; an exhausted script answers
/// "up to date".
pub struct FakeUpdateClient {
    responses: Mutex<VecDeque<Result<CheckResult>>>,
    calls: AtomicU32,
    delay: Duration,
}

impl FakeUpdateClient {
    /// A client that always answers "up to date"
    pub fn up_to_date() -> Self {
        Self::scripted(vec![])
    }

    /// A client replaying the given responses in order
    pub fn scripted(responses: Vec<Result<CheckResult>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    /// A client that repeatedly offers one update
    pub fn offering(update: RemoteUpdate) -> Self {
        let client = Self::scripted(vec![]);
        *client.responses.lock().unwrap() = std::iter::repeat_with(|| {
            Ok(CheckResult {
                update: Some(update.clone()),
                binary_version_mismatch: false,
            })
        })
        .take(16)
        .collect();
        client
    }

    /// Delay each check by `delay` to widen race windows in tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of checks performed
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdateClient for FakeUpdateClient {
    async fn check_for_update(&self, _current_hash: Option<&str>) -> Result<CheckResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CheckResult::up_to_date()))
    }
}

/// Transport writing fixed bundle content to disk
pub struct FakeTransport {
    content: Vec<u8>,
    delay: Duration,
    failures_remaining: AtomicU32,
    fetches: AtomicU32,
}

impl FakeTransport {
    /// A transport serving `content` for every update
    pub fn serving(content: &[u8]) -> Self {
        Self {
            content: content.to_vec(),
            delay: Duration::ZERO,
            failures_remaining: AtomicU32::new(0),
            fetches: AtomicU32::new(0),
        }
    }

    /// Fail the first `count` fetches with a network error
    pub fn failing_first(self, count: u32) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Delay each fetch by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of fetch attempts made
    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(
        &self,
        update: &RemoteUpdate,
        dest_dir: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<TransferOutcome> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::network("fake transfer failure"));
        }

        std::fs::create_dir_all(dest_dir)?;
        let bundle_path = dest_dir.join(update.hash());
        std::fs::write(&bundle_path, &self.content)?;

        let total = self.content.len() as u64;
        if let Some(progress) = progress {
            progress(total, total);
        }

        Ok(TransferOutcome {
            bundle_path,
            bytes: total,
            verified: true,
        })
    }
}

/// Metrics sink recording every body it receives
pub struct FakeSink {
    download_bodies: Mutex<Vec<DownloadStatusBody>>,
    deploy_bodies: Mutex<Vec<DeployStatusBody>>,
    failures_remaining: AtomicU32,
    delay: Duration,
}

impl FakeSink {
    /// A sink accepting every body
    pub fn new() -> Self {
        Self {
            download_bodies: Mutex::new(Vec::new()),
            deploy_bodies: Mutex::new(Vec::new()),
            failures_remaining: AtomicU32::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Fail the next `count` sends with a network error
    pub fn failing_next(self, count: u32) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    /// Delay each send by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn gate(&self) -> Result<()> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::network("fake sink failure"));
        }
        Ok(())
    }

    /// Download-status bodies received so far
    pub fn download_bodies(&self) -> Vec<DownloadStatusBody> {
        self.download_bodies.lock().unwrap().clone()
    }

    /// Deploy-status bodies received so far
    pub fn deploy_bodies(&self) -> Vec<DeployStatusBody> {
        self.deploy_bodies.lock().unwrap().clone()
    }

    /// Total bodies received
    pub fn total(&self) -> usize {
        self.download_bodies.lock().unwrap().len() + self.deploy_bodies.lock().unwrap().len()
    }
}

impl Default for FakeSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSink for FakeSink {
    async fn send_download_status(&self, body: &DownloadStatusBody) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.gate()?;
        self.download_bodies.lock().unwrap().push(body.clone());
        Ok(())
    }

    async fn send_deploy_status(&self, body: &DeployStatusBody) -> Result<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.gate()?;
        self.deploy_bodies.lock().unwrap().push(body.clone());
        Ok(())
    }
}

/// Dialog answering with a fixed choice
pub struct ScriptedDialog {
    accept: bool,
    confirms: AtomicU32,
    last_mandatory: Mutex<Option<bool>>,
}

impl ScriptedDialog {
    /// A dialog that always accepts
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            accept: true,
            confirms: AtomicU32::new(0),
            last_mandatory: Mutex::new(None),
        })
    }

    /// A dialog that always declines
    pub fn declining() -> Arc<Self> {
        Arc::new(Self {
            accept: false,
            confirms: AtomicU32::new(0),
            last_mandatory: Mutex::new(None),
        })
    }

    /// Number of times the dialog was shown
    pub fn confirms(&self) -> u32 {
        self.confirms.load(Ordering::SeqCst)
    }

    /// Whether the most recent confirmation was for a mandatory update
    pub fn last_mandatory(&self) -> Option<bool> {
        *self.last_mandatory.lock().unwrap()
    }
}

#[async_trait]
impl UpdateDialog for ScriptedDialog {
    async fn confirm(&self, _update: &RemoteUpdate, mandatory: bool) -> bool {
        self.confirms.fetch_add(1, Ordering::SeqCst);
        *self.last_mandatory.lock().unwrap() = Some(mandatory);
        self.accept
    }
}
