//! Update check against the deployment service

use airlift_core::{Error, Result};
use async_trait::async_trait;
use semver::VersionReq;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::package::{PackageDescriptor, RemoteUpdate};

/// Outcome of an update check
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// The newer package, when the service has one for this deployment
    pub update: Option<RemoteUpdate>,

    /// The service signaled that the native binary itself must be upgraded
    /// before this deployment's newest package can run
    pub binary_version_mismatch: bool,
}

impl CheckResult {
    /// A result carrying no update
    pub fn up_to_date() -> Self {
        Self {
            update: None,
            binary_version_mismatch: false,
        }
    }
}

/// Queries the deployment service for a newer package
#[async_trait]
pub trait UpdateClient: Send + Sync {
    /// Check whether a package newer than `current_hash` exists
    ///
    /// `None` for `current_hash` means the app is running its built-in
    /// bundle.
    async fn check_for_update(&self, current_hash: Option<&str>) -> Result<CheckResult>;
}

/// Wire model of the service's update-check response
#[derive(Debug, Deserialize)]
struct UpdateCheckResponse {
    update_info: Option<UpdateInfo>,
}

#[derive(Debug, Deserialize)]
struct UpdateInfo {
    is_available: bool,

    /// Set when the newest release targets a newer host binary
    #[serde(default)]
    update_app_version: bool,

    #[serde(default)]
    is_mandatory: bool,

    package_hash: Option<String>,
    label: Option<String>,
    target_binary_range: Option<String>,
    package_size: Option<u64>,
    description: Option<String>,
    download_url: Option<String>,
    diff_download_url: Option<String>,
    diff_package_size: Option<u64>,
}

/// HTTP implementation of [`UpdateClient`]
pub struct HttpUpdateClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpUpdateClient {
    /// Create a client for the given deployment
    pub fn new(config: ClientConfig, user_agent: &str, timeout: Duration) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .timeout(timeout)
                .build()
                .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?,
            config,
        })
    }

    /// Create a client using the runtime network configuration
    pub fn from_network(
        config: ClientConfig,
        network: &airlift_core::config::NetworkConfig,
    ) -> Result<Self> {
        Self::new(
            config,
            &network.user_agent,
            Duration::from_secs(network.http_timeout_secs),
        )
    }

    fn check_url(&self) -> String {
        format!(
            "{}/v1/update_check",
            self.config.server_url.trim_end_matches('/')
        )
    }

    /// Whether the offered range admits the host binary version
    ///
    /// An unparsable or absent range is treated as matching; the service is
    /// the authority and already filtered by binary version.
    fn range_matches(&self, range: Option<&str>) -> bool {
        let Some(range) = range else { return true };
        let Ok(req) = VersionReq::parse(range) else {
            debug!(range = range, "unparsable target binary range, accepting");
            return true;
        };
        match self.config.binary_version() {
            Ok(version) => req.matches(&version),
            Err(_) => true,
        }
    }
}

#[async_trait]
impl UpdateClient for HttpUpdateClient {
    async fn check_for_update(&self, current_hash: Option<&str>) -> Result<CheckResult> {
        let mut query = vec![
            ("deployment_key", self.config.deployment_key.clone()),
            ("app_version", self.config.app_version.clone()),
            ("client_unique_id", self.config.client_id.clone()),
        ];
        if let Some(hash) = current_hash {
            query.push(("package_hash", hash.to_string()));
        }

        debug!(url = %self.check_url(), "checking for update");

        let response = self
            .client
            .get(self.check_url())
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::network(format!("update check request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::network(format!(
                "update check failed with status {}",
                response.status()
            )));
        }

        let body: UpdateCheckResponse = response
            .json()
            .await
            .map_err(|e| Error::network(format!("malformed update check response: {e}")))?;

        let Some(info) = body.update_info else {
            return Ok(CheckResult::up_to_date());
        };

        if info.update_app_version {
            info!("newest release requires a newer host binary");
            let update = self.build_update(&info);
            return Ok(CheckResult {
                update,
                binary_version_mismatch: true,
            });
        }

        if !info.is_available {
            return Ok(CheckResult::up_to_date());
        }

        if !self.range_matches(info.target_binary_range.as_deref()) {
            info!("offered package targets a different binary range");
            let update = self.build_update(&info);
            return Ok(CheckResult {
                update,
                binary_version_mismatch: true,
            });
        }

        match self.build_update(&info) {
            Some(update) => {
                info!(label = %update.descriptor.label, "update available");
                Ok(CheckResult {
                    update: Some(update),
                    binary_version_mismatch: false,
                })
            }
            None => Err(Error::network(
                "update check response missing package fields",
            )),
        }
    }
}

impl HttpUpdateClient {
    fn build_update(&self, info: &UpdateInfo) -> Option<RemoteUpdate> {
        let hash = info.package_hash.clone()?;
        let download_url = info.download_url.clone()?;

        Some(RemoteUpdate {
            descriptor: PackageDescriptor {
                hash,
                label: info.label.clone().unwrap_or_default(),
                target_binary_range: info
                    .target_binary_range
                    .clone()
                    .unwrap_or_else(|| "*".to_string()),
                mandatory: info.is_mandatory,
                size: info.package_size.unwrap_or(0),
                description: info.description.clone(),
                deployment_key: self.config.deployment_key.clone(),
            },
            download_url,
            diff_download_url: info.diff_download_url.clone(),
            diff_size: info.diff_package_size,
        })
    }
}
