//! Over-the-air update client for content-addressed application bundles
//!
//! Provides:
//! - Update checking against a deployment service
//! - Serialized bundle downloads with retry, backoff, and statistics
//! - Install-pending-restart semantics with a crash-durable rollback watchdog
//! - Batched, persisted lifecycle telemetry
//! - A single-flight `sync()` orchestrating the whole lifecycle
//!
//! Services are explicitly constructed and wired by the host's composition
//! root; nothing in this crate is a global.

pub mod client;
pub mod config;
pub mod metrics;
pub mod package;
pub mod queue;
pub mod restart;
pub mod rollback;
pub mod store;
pub mod sync;
pub mod transport;

pub use client::{CheckResult, HttpUpdateClient, UpdateClient};
pub use config::ClientConfig;
pub use metrics::{
    DeployStatus, HttpMetricsSink, MetricEvent, MetricKind, MetricsReporter, MetricsSink,
};
pub use package::{InstallMode, LocalUpdate, PackageDescriptor, RemoteUpdate, SyncStatus, UpdateState};
pub use queue::{DownloadHandle, DownloadQueue, QueueEvent, QueueStatistics};
pub use restart::RestartGate;
pub use rollback::{RollbackManager, RollbackMetadata, RollbackRecord};
pub use store::{
    FailedUpdate, FilePackageStore, FileTelemetryStore, MemoryPackageStore, MemoryTelemetryStore,
    PackageStore, TelemetryStore,
};
pub use sync::{SyncCoordinator, SyncHooks, SyncOptions, UpdateDialog};
pub use transport::{HttpTransport, ProgressFn, Transport, TransferOutcome};
