//! Circuit breaker guarding a single downstream resource.
//!
//! One breaker instance protects one logical dependency; callers must
//! share the instance to get meaningful protection.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::error::{ErrorCode, OpsKitError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of a breaker, for external observability.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    /// Time elapsed since the most recent failure, if any.
    pub last_failure_age: Option<Duration>,
}

pub struct CircuitBreaker {
    state: Mutex<CircuitState>,
    failure_count: Mutex<u32>,
    last_failure_at: Mutex<Option<Instant>>,
    threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(CircuitState::Closed),
            failure_count: Mutex::new(0),
            last_failure_at: Mutex::new(None),
            threshold,
            reset_timeout,
        }
    }

    /// Current state, promoting `Open` to `HalfOpen` once the reset
    /// timeout has elapsed since the last failure.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        let last_failure_at = self.last_failure_at.lock();

        if *state == CircuitState::Open {
            if let Some(failed_at) = *last_failure_at {
                if failed_at.elapsed() >= self.reset_timeout {
                    *state = CircuitState::HalfOpen;
                    tracing::debug!("circuit breaker half-open after reset timeout");
                }
            }
        }

        *state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    pub fn failure_count(&self) -> u32 {
        *self.failure_count.lock()
    }

    pub fn can_execute(&self) -> bool {
        let state = self.state();
        state == CircuitState::Closed || state == CircuitState::HalfOpen
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        let mut failure_count = self.failure_count.lock();

        *failure_count = 0;
        *state = CircuitState::Closed;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        let mut failure_count = self.failure_count.lock();
        let mut last_failure_at = self.last_failure_at.lock();

        *failure_count += 1;
        *last_failure_at = Some(Instant::now());

        if *state == CircuitState::HalfOpen || *failure_count >= self.threshold {
            if *state != CircuitState::Open {
                tracing::debug!(failures = *failure_count, "circuit breaker opened");
            }
            *state = CircuitState::Open;
        }
    }

    /// Return to pristine closed state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let mut failure_count = self.failure_count.lock();
        let mut last_failure_at = self.last_failure_at.lock();

        *state = CircuitState::Closed;
        *failure_count = 0;
        *last_failure_at = None;
    }

    /// Snapshot of the breaker for logging or export.
    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state(),
            failures: *self.failure_count.lock(),
            last_failure_age: self.last_failure_at.lock().map(|at| at.elapsed()),
        }
    }

    /// Run a synchronous operation through the breaker.
    ///
    /// Fails fast with `ErrorCode::CircuitOpen` while open. A nested
    /// circuit-open error is not counted as a failure of this breaker.
    pub fn execute<T, F>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if !self.can_execute() {
            return Err(OpsKitError::circuit_open());
        }

        match action() {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.code != ErrorCode::CircuitOpen {
                    self.record_failure();
                }
                Err(e)
            }
        }
    }

    /// Run an async operation through the breaker.
    pub async fn execute_async<T, F, Fut>(&self, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        if !self.can_execute() {
            return Err(OpsKitError::circuit_open());
        }

        match action().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.code != ErrorCode::CircuitOpen {
                    self.record_failure();
                }
                Err(e)
            }
        }
    }

    /// Like [`execute`](Self::execute), but substitutes a fallback value
    /// instead of failing fast while the circuit is open.
    pub fn execute_with_fallback<T, F, G>(&self, action: F, fallback: G) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
        G: FnOnce() -> T,
    {
        if !self.can_execute() {
            return Ok(fallback());
        }

        match action() {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.code != ErrorCode::CircuitOpen {
                    self.record_failure();
                }
                Err(e)
            }
        }
    }
}
