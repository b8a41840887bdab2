//! Adaptive poller with exponential backoff.
//!
//! Repeatedly invokes an async poll function. A poll that reports
//! progress resets the interval; a miss or an error widens it, capped at
//! a maximum. Poll errors never terminate the loop.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{ErrorCode, OpsKitError, Result};

/// Default initial polling interval in seconds.
pub const DEFAULT_INITIAL_INTERVAL_SECS: u64 = 30;

/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default maximum interval in seconds.
pub const DEFAULT_MAX_INTERVAL_SECS: u64 = 300;

/// Default jitter in milliseconds.
pub const DEFAULT_JITTER_MS: u64 = 1000;

/// Configuration for the poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval used after a successful poll. Default: 30 seconds
    pub initial_interval: Duration,

    /// Backoff multiplier applied after a miss or error. Default: 2.0
    pub backoff_multiplier: f64,

    /// Maximum interval after backoff. Default: 5 minutes
    pub max_interval: Duration,

    /// Maximum jitter added to each sleep. Default: 1000ms
    pub jitter_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(DEFAULT_INITIAL_INTERVAL_SECS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_interval: Duration::from_secs(DEFAULT_MAX_INTERVAL_SECS),
            jitter_ms: DEFAULT_JITTER_MS,
        }
    }
}

impl PollerConfig {
    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            ..Default::default()
        }
    }

    pub fn builder() -> PollerConfigBuilder {
        PollerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_interval.is_zero() {
            return Err(OpsKitError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "initial_interval must be positive",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(OpsKitError::config_error(
                ErrorCode::ConfigInvalidMultiplier,
                "backoff_multiplier must be at least 1.0",
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(OpsKitError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "max_interval must not be smaller than initial_interval",
            ));
        }
        Ok(())
    }
}

/// Builder for PollerConfig.
#[derive(Debug, Default)]
pub struct PollerConfigBuilder {
    initial_interval: Option<Duration>,
    backoff_multiplier: Option<f64>,
    max_interval: Option<Duration>,
    jitter_ms: Option<u64>,
}

impl PollerConfigBuilder {
    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = Some(interval);
        self
    }

    pub fn initial_interval_secs(mut self, secs: u64) -> Self {
        self.initial_interval = Some(Duration::from_secs(secs));
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    pub fn max_interval(mut self, max: Duration) -> Self {
        self.max_interval = Some(max);
        self
    }

    pub fn max_interval_secs(mut self, secs: u64) -> Self {
        self.max_interval = Some(Duration::from_secs(secs));
        self
    }

    pub fn jitter_ms(mut self, jitter: u64) -> Self {
        self.jitter_ms = Some(jitter);
        self
    }

    pub fn build(self) -> PollerConfig {
        PollerConfig {
            initial_interval: self
                .initial_interval
                .unwrap_or(Duration::from_secs(DEFAULT_INITIAL_INTERVAL_SECS)),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(DEFAULT_BACKOFF_MULTIPLIER),
            max_interval: self
                .max_interval
                .unwrap_or(Duration::from_secs(DEFAULT_MAX_INTERVAL_SECS)),
            jitter_ms: self.jitter_ms.unwrap_or(DEFAULT_JITTER_MS),
        }
    }
}

/// Poll callback. `Ok(true)` means the poll made progress and the
/// interval resets; `Ok(false)` or `Err(_)` widens the interval.
pub type PollFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<bool>> + Send>> + Send + Sync>;

/// Point-in-time view of a poller, for external observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerStatus {
    pub is_polling: bool,
    pub current_interval: Duration,
    pub max_interval: Duration,
    pub consecutive_misses: u32,
}

/// Self-rescheduling poll loop with adaptive interval.
///
/// At most one scheduled poll exists at any time; `stop` cancels it.
pub struct Poller {
    config: PollerConfig,
    current_interval: Arc<parking_lot::Mutex<Duration>>,
    consecutive_misses: Arc<AtomicU32>,
    is_polling: Arc<AtomicBool>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    poll_now_tx: Option<mpsc::Sender<()>>,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        let interval = config.initial_interval;
        Self {
            config,
            current_interval: Arc::new(parking_lot::Mutex::new(interval)),
            consecutive_misses: Arc::new(AtomicU32::new(0)),
            is_polling: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            poll_now_tx: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PollerConfig::default())
    }

    /// Start the poll loop. The first poll runs immediately; each
    /// subsequent poll runs after the current interval plus jitter.
    pub fn start(&mut self, poll_fn: PollFn) -> Result<()> {
        if self.is_polling.load(Ordering::SeqCst) {
            return Err(OpsKitError::new(
                ErrorCode::PollerAlreadyRunning,
                "Poller is already running",
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (poll_now_tx, mut poll_now_rx) = mpsc::channel::<()>(10);
        self.shutdown_tx = Some(shutdown_tx);
        self.poll_now_tx = Some(poll_now_tx);
        self.is_polling.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let current_interval = Arc::clone(&self.current_interval);
        let consecutive_misses = Arc::clone(&self.consecutive_misses);
        let is_polling = Arc::clone(&self.is_polling);

        tokio::spawn(async move {
            Self::execute_poll(&poll_fn, &config, &current_interval, &consecutive_misses).await;

            loop {
                let delay = Self::with_jitter(&config, *current_interval.lock());

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("poller shutting down");
                        break;
                    }
                    _ = poll_now_rx.recv() => {
                        tracing::debug!("immediate poll requested");
                        Self::execute_poll(
                            &poll_fn,
                            &config,
                            &current_interval,
                            &consecutive_misses,
                        ).await;
                    }
                    _ = tokio::time::sleep(delay) => {
                        if !is_polling.load(Ordering::SeqCst) {
                            break;
                        }

                        Self::execute_poll(
                            &poll_fn,
                            &config,
                            &current_interval,
                            &consecutive_misses,
                        ).await;
                    }
                }
            }

            is_polling.store(false, Ordering::SeqCst);
        });

        tracing::debug!(interval = ?self.config.initial_interval, "poller started");
        Ok(())
    }

    async fn execute_poll(
        poll_fn: &PollFn,
        config: &PollerConfig,
        current_interval: &Arc<parking_lot::Mutex<Duration>>,
        consecutive_misses: &Arc<AtomicU32>,
    ) {
        match poll_fn().await {
            Ok(true) => {
                consecutive_misses.store(0, Ordering::SeqCst);
                *current_interval.lock() = config.initial_interval;
                tracing::debug!(interval = ?config.initial_interval, "poll hit, interval reset");
            }
            Ok(false) => {
                let misses = consecutive_misses.fetch_add(1, Ordering::SeqCst) + 1;
                let new_interval = Self::widen(config, *current_interval.lock());
                *current_interval.lock() = new_interval;
                tracing::debug!(misses, interval = ?new_interval, "poll miss, backing off");
            }
            Err(e) => {
                // Errors are absorbed; the loop must survive transient faults
                let misses = consecutive_misses.fetch_add(1, Ordering::SeqCst) + 1;
                let new_interval = Self::widen(config, *current_interval.lock());
                *current_interval.lock() = new_interval;
                tracing::warn!(error = %e, misses, interval = ?new_interval, "poll failed, backing off");
            }
        }
    }

    /// Multiply the interval by the backoff multiplier, capped at the max.
    fn widen(config: &PollerConfig, current: Duration) -> Duration {
        let widened_ms = current.as_millis() as f64 * config.backoff_multiplier;
        let capped_ms = widened_ms.min(config.max_interval.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    fn with_jitter(config: &PollerConfig, interval: Duration) -> Duration {
        let jitter = (rand::random::<f64>() * config.jitter_ms as f64) as u64;
        interval + Duration::from_millis(jitter)
    }

    /// Stop the poller, cancelling the pending scheduled poll.
    pub async fn stop(&mut self) {
        if !self.is_polling.load(Ordering::SeqCst) {
            return;
        }

        self.is_polling.store(false, Ordering::SeqCst);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        self.poll_now_tx = None;

        tracing::debug!("poller stopped");
    }

    /// Trigger an immediate out-of-band poll.
    pub async fn poll_now(&self) {
        if let Some(ref tx) = self.poll_now_tx {
            let _ = tx.send(()).await;
        }
    }

    pub fn is_polling(&self) -> bool {
        self.is_polling.load(Ordering::SeqCst)
    }

    pub fn current_interval(&self) -> Duration {
        *self.current_interval.lock()
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses.load(Ordering::SeqCst)
    }

    /// Snapshot of the poller for logging or export.
    pub fn status(&self) -> PollerStatus {
        PollerStatus {
            is_polling: self.is_polling(),
            current_interval: self.current_interval(),
            max_interval: self.config.max_interval,
            consecutive_misses: self.consecutive_misses(),
        }
    }

    /// Restore the initial interval and clear the miss counter.
    pub fn reset(&self) {
        self.consecutive_misses.store(0, Ordering::SeqCst);
        *self.current_interval.lock() = self.config.initial_interval;
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.is_polling.store(false, Ordering::SeqCst);
    }
}
