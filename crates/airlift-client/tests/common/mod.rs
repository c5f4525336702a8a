//! Common test infrastructure for airlift-client tests
//!
//! Shared constants, builders, fakes, and a wired-up harness to reduce
//! duplication across test files.
//!
//! # Usage
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

// Allow unused code in test infrastructure - not every test file uses every helper
#![allow(dead_code)]

pub mod builders;
pub mod constants;
pub mod fakes;
pub mod harness;

pub use builders::*;
pub use constants::*;
pub use fakes::*;
pub use harness::*;

// Trait methods on the stores are exercised throughout the test suite; bring
// the traits into scope for every test file via `use common::*`.
pub use airlift_client::{PackageStore, TelemetryStore};

/// Install a test subscriber so `RUST_LOG=debug cargo test` shows traces
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
