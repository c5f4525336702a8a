//! Bundle transfer with streaming download and content verification
//!
//! The transport performs exactly one transfer attempt; retry and backoff
//! belong to the download queue. When the service produced a differential
//! patch it is preferred, and the result is still verified against the full
//! content hash (the service applies the patch server-side).

use airlift_core::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::package::RemoteUpdate;

/// Progress callback: `(received_bytes, total_bytes)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Result of a single completed transfer
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Where the bundle bytes were written
    pub bundle_path: PathBuf,

    /// Bytes transferred
    pub bytes: u64,

    /// Whether the content hash was verified
    pub verified: bool,
}

/// Performs one bundle transfer attempt
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transfer the update's bundle into `dest_dir`
    ///
    /// Implementations must verify the content hash unless verification is
    /// explicitly disabled, and report the downgrade in the outcome.
    async fn fetch(
        &self,
        update: &RemoteUpdate,
        dest_dir: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<TransferOutcome>;
}

/// HTTP implementation of [`Transport`]
pub struct HttpTransport {
    client: reqwest::Client,

    /// Verify the SHA-256 of downloaded bytes against the descriptor hash
    verify_integrity: bool,
}

impl HttpTransport {
    /// Create a transport with integrity verification enabled
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(timeout)
                .build()
                .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?,
            verify_integrity: true,
        })
    }

    /// Create a transport using the runtime network configuration
    pub fn from_network(network: &airlift_core::config::NetworkConfig) -> Result<Self> {
        Self::new(
            &network.user_agent,
            Duration::from_secs(network.download_timeout_secs),
        )
    }

    /// Disable content verification
    ///
    /// This is an explicit trust downgrade onto transport-level security;
    /// every unverified transfer is logged and marked in its outcome.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }

    /// Calculate the SHA-256 digest of a file
    pub fn checksum_file(path: &Path) -> Result<String> {
        use std::io::Read;

        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 1024 * 1024];

        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(
        &self,
        update: &RemoteUpdate,
        dest_dir: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<TransferOutcome> {
        let (url, expected_size) = match (&update.diff_download_url, update.diff_size) {
            (Some(diff_url), Some(size)) => {
                debug!(hash = %update.hash(), "using differential package");
                (diff_url.as_str(), size)
            }
            _ => (update.download_url.as_str(), update.descriptor.size),
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::network(format!("download request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "download failed with status {}",
                response.status()
            )));
        }

        let total = response.content_length().unwrap_or(expected_size);

        std::fs::create_dir_all(dest_dir)?;
        let bundle_path = dest_dir.join(update.hash());
        let tmp_path = dest_dir.join(format!("{}.tmp", update.hash()));

        let mut file = std::fs::File::create(&tmp_path)?;
        let mut hasher = Sha256::new();
        let mut received: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk: bytes::Bytes =
                chunk.map_err(|e| Error::network(format!("download interrupted: {e}")))?;
            file.write_all(&chunk)?;
            hasher.update(&chunk);
            received += chunk.len() as u64;

            if let Some(progress) = progress {
                progress(received, total);
            }
        }
        file.flush()?;
        drop(file);

        let verified = if self.verify_integrity {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(update.hash()) {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(Error::hash_mismatch(update.hash(), actual));
            }
            true
        } else {
            warn!(
                hash = %update.hash(),
                "integrity verification disabled, trusting transport security"
            );
            false
        };

        std::fs::rename(&tmp_path, &bundle_path)?;

        info!(hash = %update.hash(), bytes = received, verified, "bundle transferred");

        Ok(TransferOutcome {
            bundle_path,
            bytes: received,
            verified,
        })
    }
}
