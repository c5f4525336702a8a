//! # airlift-core
//!
//! Core library for the Airlift OTA client providing:
//! - Error taxonomy shared across the client crates
//! - Retry execution engine with policy-based configuration
//! - Runtime configuration loading (airlift.yaml)

pub mod config;
pub mod error;
pub mod retry;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
