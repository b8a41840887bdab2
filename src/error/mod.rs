use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Transient failures (retryable by default)
    Timeout,
    ConnectionFailed,
    Unavailable,
    RateLimited,

    // Circuit breaker
    CircuitOpen,

    // Retry
    RetryExhausted,

    // Batch processing
    BatchClosed,
    BatchQueueFull,
    BatchResultMismatch,

    // Poller lifecycle
    PollerAlreadyRunning,

    // Configuration
    ConfigInvalidInterval,
    ConfigInvalidThreshold,
    ConfigInvalidBatchSize,
    ConfigInvalidMultiplier,

    // Generic caller-side failure (never retried by default)
    OperationFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::RetryExhausted => "RETRY_EXHAUSTED",
            ErrorCode::BatchClosed => "BATCH_CLOSED",
            ErrorCode::BatchQueueFull => "BATCH_QUEUE_FULL",
            ErrorCode::BatchResultMismatch => "BATCH_RESULT_MISMATCH",
            ErrorCode::PollerAlreadyRunning => "POLLER_ALREADY_RUNNING",
            ErrorCode::ConfigInvalidInterval => "CONFIG_INVALID_INTERVAL",
            ErrorCode::ConfigInvalidThreshold => "CONFIG_INVALID_THRESHOLD",
            ErrorCode::ConfigInvalidBatchSize => "CONFIG_INVALID_BATCH_SIZE",
            ErrorCode::ConfigInvalidMultiplier => "CONFIG_INVALID_MULTIPLIER",
            ErrorCode::OperationFailed => "OPERATION_FAILED",
        }
    }

    /// Whether an error with this code represents a transient condition
    /// that may succeed on a later attempt.
    ///
    /// This is a broader question than "should this be retried right now":
    /// `CircuitOpen` is recoverable (the breaker half-opens once its reset
    /// timeout elapses) but is deliberately excluded from
    /// [`retry::is_retryable`](crate::retry::is_retryable), since retrying
    /// into an open circuit just fails fast again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout
                | ErrorCode::ConnectionFailed
                | ErrorCode::Unavailable
                | ErrorCode::RateLimited
                | ErrorCode::CircuitOpen
        )
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct OpsKitError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl OpsKitError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OperationFailed, message)
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn circuit_open() -> Self {
        Self::new(ErrorCode::CircuitOpen, "Circuit breaker is open")
    }

    pub fn is_recoverable(&self) -> bool {
        self.code.is_recoverable()
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConfigInvalidInterval
                | ErrorCode::ConfigInvalidThreshold
                | ErrorCode::ConfigInvalidBatchSize
                | ErrorCode::ConfigInvalidMultiplier
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, OpsKitError>;
