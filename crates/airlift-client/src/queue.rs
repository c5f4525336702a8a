//! Sequential download queue
//!
//! The queue is the single arbiter of download concurrency: any number of
//! logical callers may enqueue, transfers run strictly FIFO with at most one
//! in flight, and each transfer is retried with capped exponential backoff
//! before its handle rejects. Pausing gates the loop between items and never
//! interrupts an active transfer; neither does cancellation, which only
//! removes still-queued items.

use airlift_core::retry::{BackoffPolicy, RetryError, RetryRunner, TracingObserver, TransientOnly};
use airlift_core::{Error, Result};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::package::{LocalUpdate, RemoteUpdate};
use crate::transport::{ProgressFn, Transport};

/// Queue lifecycle events, published to every subscriber
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A transfer left the queue and started
    Started { id: uuid::Uuid, hash: String },

    /// A transfer completed and its handle resolved
    Completed {
        id: uuid::Uuid,
        hash: String,
        bytes: u64,
        duration_ms: u64,
    },

    /// A transfer exhausted its retries and its handle rejected
    Failed {
        id: uuid::Uuid,
        hash: String,
        attempts: u32,
        error: String,
    },

    /// A still-queued item was cancelled
    Canceled { id: uuid::Uuid, hash: String },

    /// The queue ran dry and went idle
    Drained,
}

/// Running statistics snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueStatistics {
    /// Downloads ever enqueued
    pub enqueued: u64,

    /// Downloads that completed
    pub completed: u64,

    /// Downloads that exhausted their retries
    pub failed: u64,

    /// Downloads cancelled while still queued
    pub canceled: u64,

    /// Completed downloads as a share of finished ones (completed + failed)
    pub success_rate: f64,

    /// Mean time an item waited before its transfer started, in ms
    pub avg_wait_ms: f64,

    /// Mean transfer duration for completed items, in ms
    pub avg_transfer_ms: f64,

    /// Total bytes transferred by completed downloads
    pub bytes_transferred: u64,

    /// Historical peak number of items waiting behind the active transfer
    pub max_queue_depth: usize,
}

#[derive(Debug, Default)]
struct StatsState {
    enqueued: u64,
    completed: u64,
    failed: u64,
    canceled: u64,
    bytes_transferred: u64,
    wait_ms_total: u64,
    wait_samples: u64,
    transfer_ms_total: u64,
    max_queue_depth: usize,
}

impl StatsState {
    fn snapshot(&self) -> QueueStatistics {
        let finished = self.completed + self.failed;
        QueueStatistics {
            enqueued: self.enqueued,
            completed: self.completed,
            failed: self.failed,
            canceled: self.canceled,
            success_rate: if finished > 0 {
                self.completed as f64 / finished as f64
            } else {
                0.0
            },
            avg_wait_ms: if self.wait_samples > 0 {
                self.wait_ms_total as f64 / self.wait_samples as f64
            } else {
                0.0
            },
            avg_transfer_ms: if self.completed > 0 {
                self.transfer_ms_total as f64 / self.completed as f64
            } else {
                0.0
            },
            bytes_transferred: self.bytes_transferred,
            max_queue_depth: self.max_queue_depth,
        }
    }
}

struct QueueItem {
    id: uuid::Uuid,
    update: RemoteUpdate,
    progress: Option<ProgressFn>,
    done: oneshot::Sender<Result<LocalUpdate>>,
    enqueued_at: Instant,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueueItem>,
    current: Option<uuid::Uuid>,
    draining: bool,
    paused: bool,
}

struct QueueInner {
    transport: Arc<dyn Transport>,
    policy: BackoffPolicy,
    download_dir: PathBuf,
    state: Mutex<QueueState>,
    stats: Mutex<StatsState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<QueueEvent>>>,
}

/// Completion handle for one enqueued download
pub struct DownloadHandle {
    id: uuid::Uuid,
    rx: oneshot::Receiver<Result<LocalUpdate>>,
}

impl DownloadHandle {
    /// Identifier of the queued item, usable with [`DownloadQueue::cancel`]
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Wait for the transfer to finally succeed or exhaust its retries
    pub async fn wait(self) -> Result<LocalUpdate> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(Error::canceled("download queue dropped the item")))
    }
}

/// FIFO, single-concurrency download queue with retry and statistics
///
/// Cheap to clone; clones share the queue.
#[derive(Clone)]
pub struct DownloadQueue {
    inner: Arc<QueueInner>,
}

impl DownloadQueue {
    /// Create a queue transferring through `transport` into `download_dir`
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: BackoffPolicy,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                transport,
                policy,
                download_dir: download_dir.into(),
                state: Mutex::new(QueueState::default()),
                stats: Mutex::new(StatsState::default()),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Append a download and return its completion handle
    ///
    /// Never blocks. If the queue is idle it starts draining immediately,
    /// otherwise the item waits its turn.
    pub fn enqueue(&self, update: RemoteUpdate, progress: Option<ProgressFn>) -> DownloadHandle {
        let (tx, rx) = oneshot::channel();
        let id = uuid::Uuid::new_v4();
        let item = QueueItem {
            id,
            update,
            progress,
            done: tx,
            enqueued_at: Instant::now(),
        };

        let start_drain = {
            let mut state = self.inner.state.lock().unwrap();
            state.pending.push_back(item);

            let mut stats = self.inner.stats.lock().unwrap();
            stats.enqueued += 1;
            stats.max_queue_depth = stats.max_queue_depth.max(state.pending.len());

            if !state.draining && !state.paused {
                state.draining = true;
                true
            } else {
                false
            }
        };

        if start_drain {
            let inner = self.inner.clone();
            tokio::spawn(drain(inner));
        }

        DownloadHandle { id, rx }
    }

    /// Stop picking up new items; the active transfer keeps running
    pub fn pause(&self) {
        self.inner.state.lock().unwrap().paused = true;
        debug!("download queue paused");
    }

    /// Resume draining queued items
    pub fn resume(&self) {
        let start_drain = {
            let mut state = self.inner.state.lock().unwrap();
            state.paused = false;
            if !state.draining && !state.pending.is_empty() {
                state.draining = true;
                true
            } else {
                false
            }
        };

        if start_drain {
            let inner = self.inner.clone();
            tokio::spawn(drain(inner));
        }
        debug!("download queue resumed");
    }

    /// Cancel a still-queued download
    ///
    /// The in-flight transfer cannot be cancelled; asking to is an error.
    pub fn cancel(&self, id: uuid::Uuid) -> Result<()> {
        let item = {
            let mut state = self.inner.state.lock().unwrap();
            if state.current == Some(id) {
                return Err(Error::update("the active transfer cannot be cancelled"));
            }
            let position = state.pending.iter().position(|item| item.id == id);
            match position {
                Some(index) => state.pending.remove(index),
                None => None,
            }
        };

        let Some(item) = item else {
            return Err(Error::update("no queued download with that id"));
        };

        self.inner.stats.lock().unwrap().canceled += 1;
        let hash = item.update.hash().to_string();
        let _ = item
            .done
            .send(Err(Error::canceled("download cancelled while queued")));
        self.emit(QueueEvent::Canceled { id, hash });
        Ok(())
    }

    /// Cancel every still-queued download
    pub fn clear(&self) {
        let items: Vec<QueueItem> = {
            let mut state = self.inner.state.lock().unwrap();
            state.pending.drain(..).collect()
        };

        if items.is_empty() {
            return;
        }

        self.inner.stats.lock().unwrap().canceled += items.len() as u64;
        for item in items {
            let hash = item.update.hash().to_string();
            let id = item.id;
            let _ = item
                .done
                .send(Err(Error::canceled("download queue cleared")));
            self.emit(QueueEvent::Canceled { id, hash });
        }
    }

    /// Current statistics snapshot
    pub fn statistics(&self) -> QueueStatistics {
        self.inner.stats.lock().unwrap().snapshot()
    }

    /// Zero all counters without touching in-flight state
    pub fn reset_statistics(&self) {
        *self.inner.stats.lock().unwrap() = StatsState::default();
    }

    /// Subscribe to queue lifecycle events
    ///
    /// A dropped receiver is detached on the next emit; one dead listener
    /// never blocks the others.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<QueueEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Number of items waiting behind the active transfer
    pub fn queued(&self) -> usize {
        self.inner.state.lock().unwrap().pending.len()
    }

    /// Whether a transfer is currently in flight
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().unwrap().current.is_some()
    }

    fn emit(&self, event: QueueEvent) {
        emit(&self.inner, event);
    }
}

fn emit(inner: &QueueInner, event: QueueEvent) {
    let mut subscribers = inner.subscribers.lock().unwrap();
    let before = subscribers.len();
    subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    if subscribers.len() != before {
        debug!(
            dropped = before - subscribers.len(),
            "detached closed queue subscribers"
        );
    }
}

/// Drain loop: one task at a time, owned by whichever spawn set `draining`
async fn drain(inner: Arc<QueueInner>) {
    loop {
        let item = {
            let mut state = inner.state.lock().unwrap();
            if state.paused || state.pending.is_empty() {
                let ran_dry = state.pending.is_empty();
                state.draining = false;
                state.current = None;
                drop(state);
                if ran_dry {
                    emit(&inner, QueueEvent::Drained);
                }
                return;
            }
            let item = state.pending.pop_front().expect("pending checked non-empty");
            state.current = Some(item.id);
            item
        };

        let id = item.id;
        let hash = item.update.hash().to_string();
        emit(&inner, QueueEvent::Started {
            id,
            hash: hash.clone(),
        });

        let wait_ms = item.enqueued_at.elapsed().as_millis() as u64;
        let started = Instant::now();

        let attempts = std::sync::atomic::AtomicU32::new(0);
        let runner = RetryRunner::new(inner.policy.clone())
            .with_predicate(TransientOnly)
            .with_observer(TracingObserver::new("transfer"));

        let outcome = runner
            .run(|| {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                inner
                    .transport
                    .fetch(&item.update, &inner.download_dir, item.progress.as_ref())
            })
            .await;
        let attempts = attempts.load(std::sync::atomic::Ordering::SeqCst);

        match outcome {
            Ok(outcome) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                {
                    let mut stats = inner.stats.lock().unwrap();
                    stats.completed += 1;
                    stats.bytes_transferred += outcome.bytes;
                    stats.wait_ms_total += wait_ms;
                    stats.wait_samples += 1;
                    stats.transfer_ms_total += duration_ms;
                }

                info!(hash = %hash, bytes = outcome.bytes, attempts, "download completed");

                let local = LocalUpdate {
                    descriptor: item.update.descriptor.clone(),
                    bundle_path: outcome.bundle_path,
                    verified: outcome.verified,
                };
                let _ = item.done.send(Ok(local));
                emit(&inner, QueueEvent::Completed {
                    id,
                    hash,
                    bytes: outcome.bytes,
                    duration_ms,
                });
            }
            Err(retry_err) => {
                {
                    let mut stats = inner.stats.lock().unwrap();
                    stats.failed += 1;
                    stats.wait_ms_total += wait_ms;
                    stats.wait_samples += 1;
                }

                let error = flatten_retry_error(retry_err);
                warn!(hash = %hash, attempts, error = %error, "download failed");

                emit(&inner, QueueEvent::Failed {
                    id,
                    hash,
                    attempts,
                    error: error.to_string(),
                });
                let _ = item.done.send(Err(error));
            }
        }

        inner.state.lock().unwrap().current = None;
    }
}

fn flatten_retry_error(err: RetryError<Error>) -> Error {
    match err {
        RetryError::Exhausted { source, .. } => source,
        RetryError::NonRetryable(source) => source,
        RetryError::Aborted => Error::update("transfer never attempted"),
    }
}
