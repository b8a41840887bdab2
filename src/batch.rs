//! Batch processor: accumulates items and hands them to a user-supplied
//! handler as a group, either when the batch size is reached or when the
//! partial-batch timeout fires.
//!
//! Per-item completion is tracked in a side table of oneshot senders held
//! alongside the queue; caller items are never touched or mutated.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ErrorCode, OpsKitError, Result};

/// Default number of items that triggers an immediate flush.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default timeout for flushing a partial batch.
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 30_000;

/// Default maximum number of queued items.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Configuration for the batch processor.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Number of items that triggers an immediate flush. Default: 10
    pub batch_size: usize,

    /// How long a partial batch may wait before being flushed. Default: 30s
    pub batch_timeout: Duration,

    /// Maximum number of items allowed in the queue. Default: 1000
    pub max_queue_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

impl BatchConfig {
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(OpsKitError::config_error(
                ErrorCode::ConfigInvalidBatchSize,
                "batch_size must be at least 1",
            ));
        }
        if self.batch_timeout.is_zero() {
            return Err(OpsKitError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "batch_timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Builder for BatchConfig.
#[derive(Debug, Default)]
pub struct BatchConfigBuilder {
    batch_size: Option<usize>,
    batch_timeout: Option<Duration>,
    max_queue_size: Option<usize>,
}

impl BatchConfigBuilder {
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = Some(size);
        self
    }

    pub fn build(self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            batch_timeout: self
                .batch_timeout
                .unwrap_or(Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS)),
            max_queue_size: self.max_queue_size.unwrap_or(DEFAULT_MAX_QUEUE_SIZE),
        }
    }
}

/// Handler invoked once per batch. Must return one result per item, in
/// the same order the items were enqueued.
pub type BatchHandler<T, R> =
    Arc<dyn Fn(Vec<T>) -> Pin<Box<dyn Future<Output = Result<Vec<R>>> + Send>> + Send + Sync>;

struct PendingBatch<T, R> {
    items: Vec<T>,
    waiters: Vec<oneshot::Sender<Result<R>>>,
    deadline: Option<Instant>,
    /// Set by `stop` under the lock; once true no item is ever admitted.
    closed: bool,
}

impl<T, R> PendingBatch<T, R> {
    fn detach(&mut self) -> (Vec<T>, Vec<oneshot::Sender<Result<R>>>) {
        self.deadline = None;
        (
            std::mem::take(&mut self.items),
            std::mem::take(&mut self.waiters),
        )
    }
}

/// Control channel receivers, held until `start` claims them.
struct ControlReceivers {
    shutdown_rx: mpsc::Receiver<()>,
    flush_rx: mpsc::Receiver<()>,
    wake_rx: mpsc::Receiver<()>,
}

/// Accumulates items and processes them as groups.
///
/// Flushes happen when:
/// - the queue reaches `batch_size`
/// - `batch_timeout` elapses with a partial batch pending
/// - `flush()` is called manually
/// - `stop()` drains whatever is left
///
/// Items within a batch keep their enqueue order; no ordering is
/// guaranteed across batches.
pub struct BatchProcessor<T, R> {
    config: BatchConfig,
    pending: Arc<Mutex<PendingBatch<T, R>>>,
    handler: BatchHandler<T, R>,
    shutdown_tx: mpsc::Sender<()>,
    flush_tx: mpsc::Sender<()>,
    wake_tx: mpsc::Sender<()>,
    receivers: Mutex<Option<ControlReceivers>>,
    task: Mutex<Option<JoinHandle<()>>>,
    is_running: Arc<AtomicBool>,
}

impl<T, R> BatchProcessor<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new(config: BatchConfig, handler: BatchHandler<T, R>) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (flush_tx, flush_rx) = mpsc::channel::<()>(16);
        let (wake_tx, wake_rx) = mpsc::channel::<()>(16);

        Self {
            config,
            pending: Arc::new(Mutex::new(PendingBatch {
                items: Vec::new(),
                waiters: Vec::new(),
                deadline: None,
                closed: false,
            })),
            handler,
            shutdown_tx,
            flush_tx,
            wake_tx,
            receivers: Mutex::new(Some(ControlReceivers {
                shutdown_rx,
                flush_rx,
                wake_rx,
            })),
            task: Mutex::new(None),
            is_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background flush task. Idempotent.
    pub fn start(&self) {
        let receivers = match self.receivers.lock().take() {
            Some(receivers) => receivers,
            None => return,
        };
        let ControlReceivers {
            mut shutdown_rx,
            mut flush_rx,
            mut wake_rx,
        } = receivers;

        self.is_running.store(true, Ordering::SeqCst);

        let pending = Arc::clone(&self.pending);
        let handler = Arc::clone(&self.handler);
        let is_running = Arc::clone(&self.is_running);

        let handle = tokio::spawn(async move {
            loop {
                let deadline = pending.lock().deadline;

                match deadline {
                    Some(at) => {
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                tracing::debug!("batch processor shutting down, draining queue");
                                Self::process_pending(&pending, &handler).await;
                                break;
                            }
                            _ = flush_rx.recv() => {
                                Self::process_pending(&pending, &handler).await;
                            }
                            _ = wake_rx.recv() => {
                                // New item re-armed the deadline; re-read it
                            }
                            _ = tokio::time::sleep_until(at) => {
                                tracing::debug!("partial batch timeout elapsed, flushing");
                                Self::process_pending(&pending, &handler).await;
                            }
                        }
                    }
                    None => {
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                Self::process_pending(&pending, &handler).await;
                                break;
                            }
                            _ = flush_rx.recv() => {
                                Self::process_pending(&pending, &handler).await;
                            }
                            _ = wake_rx.recv() => {}
                        }
                    }
                }
            }

            is_running.store(false, Ordering::SeqCst);
        });

        *self.task.lock() = Some(handle);
    }

    /// Enqueue an item and wait for its result.
    ///
    /// Resolves to the handler's result at this item's position once the
    /// batch containing it has been processed.
    pub async fn add(&self, item: T) -> Result<R> {
        let (tx, rx) = oneshot::channel();

        let full_batch = {
            let mut pending = self.pending.lock();

            // Closed-ness is checked under the same lock that admits the
            // item, so an add racing stop can never enqueue into a queue
            // nothing will drain.
            if pending.closed {
                return Err(OpsKitError::new(
                    ErrorCode::BatchClosed,
                    "Batch processor has been stopped",
                ));
            }

            if pending.items.len() >= self.config.max_queue_size {
                return Err(OpsKitError::new(
                    ErrorCode::BatchQueueFull,
                    "Batch queue is full",
                ));
            }

            pending.items.push(item);
            pending.waiters.push(tx);

            if pending.items.len() >= self.config.batch_size {
                pending.deadline = None;
                true
            } else {
                // Each add re-arms the partial-batch timer
                pending.deadline = Some(Instant::now() + self.config.batch_timeout);
                false
            }
        };

        if full_batch {
            let _ = self.flush_tx.try_send(());
        } else {
            let _ = self.wake_tx.try_send(());
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(OpsKitError::new(
                ErrorCode::BatchClosed,
                "Batch processor closed before the item was processed",
            )),
        }
    }

    /// Force an immediate flush of any queued items.
    pub async fn flush(&self) -> Result<()> {
        self.flush_tx
            .send(())
            .await
            .map_err(|_| OpsKitError::new(ErrorCode::BatchClosed, "Flush channel closed"))
    }

    /// Stop the processor, flushing whatever is still queued.
    ///
    /// The queue is closed before the drain, so an `add` racing `stop`
    /// either lands in the final batch or is rejected with
    /// `ErrorCode::BatchClosed`; every admitted item resolves exactly once.
    pub async fn stop(&self) {
        self.pending.lock().closed = true;

        let _ = self.shutdown_tx.send(()).await;

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.receivers.lock().take();
        self.is_running.store(false, Ordering::SeqCst);

        // Stopped before start: reject anything that was queued while no
        // task existed to drain it
        let (_items, waiters) = self.pending.lock().detach();
        for waiter in waiters {
            let _ = waiter.send(Err(OpsKitError::new(
                ErrorCode::BatchClosed,
                "Batch processor has been stopped",
            )));
        }
    }

    pub fn queue_len(&self) -> usize {
        self.pending.lock().items.len()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Detach the current queue and run the handler over it.
    ///
    /// Detachment is atomic: items added while the handler runs form a
    /// fresh batch. Every detached waiter is completed exactly once.
    async fn process_pending(
        pending: &Arc<Mutex<PendingBatch<T, R>>>,
        handler: &BatchHandler<T, R>,
    ) {
        let (items, waiters) = pending.lock().detach();

        if items.is_empty() {
            return;
        }

        let count = items.len();

        match handler(items).await {
            Ok(results) => {
                if results.len() != count {
                    tracing::warn!(
                        expected = count,
                        returned = results.len(),
                        "batch handler returned wrong number of results"
                    );
                    for waiter in waiters {
                        let _ = waiter.send(Err(OpsKitError::new(
                            ErrorCode::BatchResultMismatch,
                            "Batch handler returned wrong number of results",
                        )));
                    }
                } else {
                    for (waiter, result) in waiters.into_iter().zip(results) {
                        let _ = waiter.send(Ok(result));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, items = count, "batch handler failed");
                let code = e.code;
                let message = e.message;
                for waiter in waiters {
                    let _ = waiter.send(Err(OpsKitError::new(code, message.clone())));
                }
            }
        }
    }
}

impl<T, R> Drop for BatchProcessor<T, R> {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}
