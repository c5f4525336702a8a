//! Client identity and deployment configuration

use airlift_core::{Error, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of this client against the deployment service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the deployment service
    pub server_url: String,

    /// Deployment the client follows; treated as a credential, never logged
    pub deployment_key: String,

    /// Semver version of the host binary
    pub app_version: String,

    /// Anonymous, stable client identifier
    #[serde(default = "generate_client_id")]
    pub client_id: String,

    /// Content hash of the package the running app was launched with, when
    /// the host was launched from an installed package rather than the
    /// binary's built-in bundle
    #[serde(default)]
    pub running_package_hash: Option<String>,
}

fn generate_client_id() -> String {
    Uuid::new_v4().to_string()
}

impl ClientConfig {
    /// Create a configuration with a fresh anonymous client id
    pub fn new(
        server_url: impl Into<String>,
        deployment_key: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            deployment_key: deployment_key.into(),
            app_version: app_version.into(),
            client_id: generate_client_id(),
            running_package_hash: None,
        }
    }

    /// Set the running package hash reported by the host at boot
    pub fn with_running_package(mut self, hash: impl Into<String>) -> Self {
        self.running_package_hash = Some(hash.into());
        self
    }

    /// Validate the configuration before any network use
    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(Error::configuration("server URL must not be empty"));
        }
        if self.deployment_key.is_empty() {
            return Err(Error::configuration("deployment key must not be empty"));
        }
        Version::parse(&self.app_version).map_err(|_| {
            Error::configuration(format!(
                "app version {:?} is not a valid semver version",
                self.app_version
            ))
        })?;
        Ok(())
    }

    /// Parsed host binary version
    pub fn binary_version(&self) -> Result<Version> {
        Version::parse(&self.app_version)
            .map_err(|_| Error::configuration("app version is not a valid semver version"))
    }
}
