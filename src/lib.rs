//! opskit
//!
//! Operational resilience primitives for async Rust services: TTL caching,
//! retry with exponential backoff, circuit breaking, request batching,
//! adaptive polling, and rate limiting.
//!
//! Every helper is an explicitly constructed, per-instance value; there are
//! no process-wide singletons. Share one instance (for example one
//! [`CircuitBreaker`] per protected resource) to get shared semantics.
//!
//! # Quick Start
//!
//! ```no_run
//! use opskit::{with_retry, CircuitBreaker, RetryConfig, TtlCache};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> opskit::Result<()> {
//!     // Cache lookups for five minutes
//!     let cache: TtlCache<String, String> = TtlCache::new(Duration::from_secs(300));
//!     cache.set("region".to_string(), "us-east-1".to_string());
//!
//!     // Retry a flaky call with exponential backoff
//!     let config = RetryConfig::builder().max_attempts(5).build();
//!     let value = with_retry(|| async { fetch_remote().await }, &config).await?;
//!
//!     // Guard a dependency with a circuit breaker
//!     let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
//!     let guarded = breaker.execute_async(|| async { fetch_remote().await }).await?;
//!
//!     println!("{value} {guarded}");
//!     Ok(())
//! }
//!
//! async fn fetch_remote() -> opskit::Result<String> {
//!     Ok("ok".to_string())
//! }
//! ```

// Module declarations
pub mod batch;
pub mod cache;
pub mod circuit_breaker;
pub mod error;
pub mod poller;
pub mod rate;
pub mod retry;

// Re-exports from error module
pub use error::{ErrorCode, OpsKitError, Result};

// Re-exports from cache module
pub use cache::TtlCache;

// Re-exports from retry module
pub use retry::{
    is_retryable, with_retry, with_retry_detailed, with_retry_predicate, RetryConfig,
    RetryConfigBuilder, RetryOutcome,
};

// Re-exports from circuit_breaker module
pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};

// Re-exports from batch module
pub use batch::{
    BatchConfig, BatchConfigBuilder, BatchHandler, BatchProcessor, DEFAULT_BATCH_SIZE,
    DEFAULT_BATCH_TIMEOUT_MS, DEFAULT_MAX_QUEUE_SIZE,
};

// Re-exports from poller module
pub use poller::{
    PollFn, Poller, PollerConfig, PollerConfigBuilder, PollerStatus, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_INITIAL_INTERVAL_SECS, DEFAULT_JITTER_MS, DEFAULT_MAX_INTERVAL_SECS,
};

// Re-exports from rate module
pub use rate::{DebounceHandler, Debouncer, Throttle};
