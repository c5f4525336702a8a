//! Builder patterns for test data construction

use airlift_client::{PackageDescriptor, RemoteUpdate};

use super::constants::*;

/// Fluent builder for [`RemoteUpdate`] with sensible test defaults
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    hash: String,
    label: String,
    target_binary_range: String,
    mandatory: bool,
    size: u64,
    description: Option<String>,
    deployment_key: String,
    download_url: Option<String>,
    diff_download_url: Option<String>,
    diff_size: Option<u64>,
}

impl UpdateBuilder {
    /// Start from the default test release
    pub fn new() -> Self {
        Self {
            hash: HASH_V2.to_string(),
            label: LABEL_V2.to_string(),
            target_binary_range: "*".to_string(),
            mandatory: false,
            size: BUNDLE_CONTENT.len() as u64,
            description: None,
            deployment_key: DEPLOYMENT_KEY.to_string(),
            download_url: None,
            diff_download_url: None,
            diff_size: None,
        }
    }

    /// Set the content hash
    pub fn hash(mut self, hash: &str) -> Self {
        self.hash = hash.to_string();
        self
    }

    /// Set the release label
    pub fn label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Set the target binary range
    pub fn target_binary_range(mut self, range: &str) -> Self {
        self.target_binary_range = range.to_string();
        self
    }

    /// Mark the release mandatory
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Set the bundle size
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the release description
    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set an explicit download URL
    pub fn download_url(mut self, url: &str) -> Self {
        self.download_url = Some(url.to_string());
        self
    }

    /// Add a differential package
    pub fn diff(mut self, url: &str, size: u64) -> Self {
        self.diff_download_url = Some(url.to_string());
        self.diff_size = Some(size);
        self
    }

    /// Build the descriptor alone
    pub fn build_descriptor(&self) -> PackageDescriptor {
        PackageDescriptor {
            hash: self.hash.clone(),
            label: self.label.clone(),
            target_binary_range: self.target_binary_range.clone(),
            mandatory: self.mandatory,
            size: self.size,
            description: self.description.clone(),
            deployment_key: self.deployment_key.clone(),
        }
    }

    /// Build the remote update
    pub fn build(self) -> RemoteUpdate {
        let download_url = self
            .download_url
            .clone()
            .unwrap_or_else(|| format!("{}/bundles/{}", SERVER_URL, self.hash));
        RemoteUpdate {
            descriptor: self.build_descriptor(),
            download_url,
            diff_download_url: self.diff_download_url,
            diff_size: self.diff_size,
        }
    }
}

impl Default for UpdateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand: a descriptor for the given hash and label
pub fn descriptor(hash: &str, label: &str) -> PackageDescriptor {
    UpdateBuilder::new().hash(hash).label(label).build_descriptor()
}

/// Shorthand: an update offer for the given hash and label
pub fn update(hash: &str, label: &str) -> RemoteUpdate {
    UpdateBuilder::new().hash(hash).label(label).build()
}
