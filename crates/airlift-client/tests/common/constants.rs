//! Shared constants for test data

/// Deployment key used across tests
pub const DEPLOYMENT_KEY: &str = "dk-test";

/// Host binary version used across tests
pub const APP_VERSION: &str = "1.2.3";

/// Server URL for fakes that never hit the network
pub const SERVER_URL: &str = "https://updates.test.invalid";

/// Content hashes
pub const HASH_V1: &str = "hash-v1";
pub const HASH_V2: &str = "hash-v2";
pub const HASH_V3: &str = "hash-v3";

/// Release labels
pub const LABEL_V1: &str = "v1";
pub const LABEL_V2: &str = "v2";
pub const LABEL_V3: &str = "v3";

/// Bundle bytes served by the fake transport
pub const BUNDLE_CONTENT: &[u8] = b"fake bundle content";
