//! Error taxonomy for the iteration loop.
//!
//! Mirrors the category/code/retryable/http-status structure the SDK's
//! `ClaudeError` used, re-keyed to the error kinds the loop actually raises:
//! transport/process failures from an executor, circuit-breaker rejections,
//! retry exhaustion, configuration problems, and persistence/parsing faults.

use std::path::PathBuf;
use thiserror::Error;

/// Error category for classifying [`LoopError`]s by source and nature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network/transport errors talking to an executor backend.
    Network,
    /// Subprocess/CLI execution errors.
    Process,
    /// Output parsing/deserialization errors.
    Parsing,
    /// Configuration errors (invalid options, missing settings).
    Configuration,
    /// Input validation errors.
    Validation,
    /// Authentication/authorization errors.
    Permission,
    /// Resource errors (not found, pool exhausted, quota exceeded).
    Resource,
    /// Internal invariant violations.
    Internal,
    /// Resilience-layer rejections (circuit open, retries exhausted).
    Resilience,
}

impl ErrorCategory {
    /// Returns true if errors in this category may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Process)
    }

    /// Returns a human-readable description of the category.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "Network or transport error",
            ErrorCategory::Process => "Executor process error",
            ErrorCategory::Parsing => "Output parsing error",
            ErrorCategory::Configuration => "Configuration or setup error",
            ErrorCategory::Validation => "Input validation error",
            ErrorCategory::Permission => "Permission or authentication error",
            ErrorCategory::Resource => "Resource not found or unavailable",
            ErrorCategory::Internal => "Internal error",
            ErrorCategory::Resilience => "Retry or circuit-breaker rejection",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Process => write!(f, "process"),
            ErrorCategory::Parsing => write!(f, "parsing"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Permission => write!(f, "permission"),
            ErrorCategory::Resource => write!(f, "resource"),
            ErrorCategory::Internal => write!(f, "internal"),
            ErrorCategory::Resilience => write!(f, "resilience"),
        }
    }
}

/// HTTP status code mapping, kept for parity with the CLI's exit-code
/// contract and for anyone embedding the loop behind an API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RequestTimeout,
    Conflict,
    UnprocessableEntity,
    TooManyRequests,
    InternalServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
}

impl HttpStatus {
    pub fn code(&self) -> u16 {
        match self {
            HttpStatus::BadRequest => 400,
            HttpStatus::Unauthorized => 401,
            HttpStatus::Forbidden => 403,
            HttpStatus::NotFound => 404,
            HttpStatus::RequestTimeout => 408,
            HttpStatus::Conflict => 409,
            HttpStatus::UnprocessableEntity => 422,
            HttpStatus::TooManyRequests => 429,
            HttpStatus::InternalServerError => 500,
            HttpStatus::BadGateway => 502,
            HttpStatus::ServiceUnavailable => 503,
            HttpStatus::GatewayTimeout => 504,
        }
    }
}

impl From<HttpStatus> for u16 {
    fn from(status: HttpStatus) -> u16 {
        status.code()
    }
}

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpStatus::BadRequest => write!(f, "400 Bad Request"),
            HttpStatus::Unauthorized => write!(f, "401 Unauthorized"),
            HttpStatus::Forbidden => write!(f, "403 Forbidden"),
            HttpStatus::NotFound => write!(f, "404 Not Found"),
            HttpStatus::RequestTimeout => write!(f, "408 Request Timeout"),
            HttpStatus::Conflict => write!(f, "409 Conflict"),
            HttpStatus::UnprocessableEntity => write!(f, "422 Unprocessable Entity"),
            HttpStatus::TooManyRequests => write!(f, "429 Too Many Requests"),
            HttpStatus::InternalServerError => write!(f, "500 Internal Server Error"),
            HttpStatus::BadGateway => write!(f, "502 Bad Gateway"),
            HttpStatus::ServiceUnavailable => write!(f, "503 Service Unavailable"),
            HttpStatus::GatewayTimeout => write!(f, "504 Gateway Timeout"),
        }
    }
}

/// Main error type for the loop client and its components.
#[derive(Debug, Error)]
pub enum LoopError {
    /// An executor call exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The circuit breaker is open and rejected the call without attempting it.
    #[error("circuit breaker open for executor {executor}, retry after {retry_after:?}")]
    CircuitOpen {
        executor: String,
        retry_after: std::time::Duration,
    },

    /// A configuration value was missing or invalid.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The executor process/backend failed to run the prompt.
    #[error("execution error: {message}")]
    ExecutionError {
        message: String,
        exit_code: Option<i32>,
        stderr: Option<String>,
    },

    /// Output from the executor could not be parsed into a structured response.
    #[error("parsing error: {0}")]
    ParsingError(String),

    /// Authentication or authorization failed against the executor backend.
    #[error("authentication error: {0}")]
    AuthError(String),

    /// A lower-level transport/connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The backend reported a quota/rate-limit condition.
    #[error("quota exceeded: {0}")]
    QuotaError(String),

    /// All configured retry attempts were exhausted.
    #[error("retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// The loop client has already been closed.
    #[error("client is closed")]
    ClientClosed,

    /// No executor could be selected for the task.
    #[error("no executor available for task")]
    NoExecutor,

    /// The session pool has no capacity left.
    #[error("session pool is full (capacity {capacity})")]
    PoolFull { capacity: usize },

    /// A named resource (session, snapshot, task) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The executor CLI binary could not be located.
    #[error("executor CLI not found: {message}")]
    CliNotFound {
        message: String,
        cli_path: Option<PathBuf>,
    },

    /// Persisting or loading state failed.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// IO error bubbled up from the filesystem or a subprocess pipe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Opaque error from a boundary collaborator (CLI binary, tests).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, LoopError>;

impl LoopError {
    /// Returns the error category for this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            LoopError::Timeout(_) => ErrorCategory::Network,
            LoopError::CircuitOpen { .. } => ErrorCategory::Resilience,
            LoopError::ConfigError(_) => ErrorCategory::Configuration,
            LoopError::ExecutionError { .. } => ErrorCategory::Process,
            LoopError::ParsingError(_) => ErrorCategory::Parsing,
            LoopError::AuthError(_) => ErrorCategory::Permission,
            LoopError::NetworkError(_) => ErrorCategory::Network,
            LoopError::QuotaError(_) => ErrorCategory::Resource,
            LoopError::RetryExhausted { .. } => ErrorCategory::Resilience,
            LoopError::ClientClosed => ErrorCategory::Internal,
            LoopError::NoExecutor => ErrorCategory::Configuration,
            LoopError::PoolFull { .. } => ErrorCategory::Resource,
            LoopError::NotFound(_) => ErrorCategory::Resource,
            LoopError::Cancelled => ErrorCategory::Internal,
            LoopError::CliNotFound { .. } => ErrorCategory::Configuration,
            LoopError::PersistenceError(_) => ErrorCategory::Internal,
            LoopError::Io(_) => ErrorCategory::Internal,
            LoopError::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a machine-readable, stable error code.
    ///
    /// Format: `E{category_prefix}{number}`.
    pub fn error_code(&self) -> &'static str {
        match self {
            LoopError::Timeout(_) => "ENET001",
            LoopError::CircuitOpen { .. } => "ERES001",
            LoopError::ConfigError(_) => "ECFG001",
            LoopError::ExecutionError { .. } => "EPROC001",
            LoopError::ParsingError(_) => "EPARSE001",
            LoopError::AuthError(_) => "EAUTH001",
            LoopError::NetworkError(_) => "ENET002",
            LoopError::QuotaError(_) => "EQUOTA001",
            LoopError::RetryExhausted { .. } => "ERES002",
            LoopError::ClientClosed => "EINT001",
            LoopError::NoExecutor => "ECFG002",
            LoopError::PoolFull { .. } => "EPOOL001",
            LoopError::NotFound(_) => "ERES003",
            LoopError::Cancelled => "EINT002",
            LoopError::CliNotFound { .. } => "ECFG003",
            LoopError::PersistenceError(_) => "EINT003",
            LoopError::Io(_) => "EINT004",
            LoopError::Other(_) => "EINT005",
        }
    }

    /// Returns true if this error may be retried by [`crate::retry::RetryExecutor`].
    ///
    /// Note this is the *default* retryability by category; `RetryPolicy`
    /// additionally consults its own retryable/non-retryable pattern lists
    /// against the error's message before deciding.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoopError::CircuitOpen { .. } | LoopError::RetryExhausted { .. } => false,
            _ => self.category().is_retryable(),
        }
    }

    /// Returns the recommended HTTP status code for this error.
    pub fn http_status(&self) -> HttpStatus {
        match self {
            LoopError::Timeout(_) => HttpStatus::GatewayTimeout,
            LoopError::CircuitOpen { .. } => HttpStatus::ServiceUnavailable,
            LoopError::ConfigError(_) => HttpStatus::InternalServerError,
            LoopError::ExecutionError { .. } => HttpStatus::BadGateway,
            LoopError::ParsingError(_) => HttpStatus::UnprocessableEntity,
            LoopError::AuthError(_) => HttpStatus::Unauthorized,
            LoopError::NetworkError(_) => HttpStatus::ServiceUnavailable,
            LoopError::QuotaError(_) => HttpStatus::TooManyRequests,
            LoopError::RetryExhausted { .. } => HttpStatus::ServiceUnavailable,
            LoopError::ClientClosed => HttpStatus::Conflict,
            LoopError::NoExecutor => HttpStatus::InternalServerError,
            LoopError::PoolFull { .. } => HttpStatus::TooManyRequests,
            LoopError::NotFound(_) => HttpStatus::NotFound,
            LoopError::Cancelled => HttpStatus::Conflict,
            LoopError::CliNotFound { .. } => HttpStatus::InternalServerError,
            LoopError::PersistenceError(_) => HttpStatus::InternalServerError,
            LoopError::Io(_) => HttpStatus::InternalServerError,
            LoopError::Other(_) => HttpStatus::InternalServerError,
        }
    }

    /// Returns a detailed error context for structured logging.
    pub fn to_error_context(&self) -> ErrorContext {
        ErrorContext {
            code: self.error_code().to_string(),
            category: self.category(),
            message: self.to_string(),
            retryable: self.is_retryable(),
            http_status: self.http_status().code(),
        }
    }
}

/// Detailed error context for logging and debugging.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
    pub http_status: u16,
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] [{}] {} (retryable: {}, http: {})",
            self.code, self.category, self.message, self.retryable, self.http_status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_retryable() {
        let err = LoopError::NetworkError("connection refused".into());
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "ENET002");
    }

    #[test]
    fn circuit_open_is_not_retryable() {
        let err = LoopError::CircuitOpen {
            executor: "cli".into(),
            retry_after: std::time::Duration::from_secs(5),
        };
        assert_eq!(err.category(), ErrorCategory::Resilience);
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_status_mapping() {
        let err = LoopError::NotFound("session abc".into());
        assert_eq!(err.http_status(), HttpStatus::NotFound);
        assert_eq!(err.http_status().code(), 404);
    }

    #[test]
    fn error_context_round_trip() {
        let err = LoopError::QuotaError("daily limit reached".into());
        let ctx = err.to_error_context();
        assert_eq!(ctx.code, "EQUOTA001");
        assert_eq!(ctx.category, ErrorCategory::Resource);
        assert_eq!(ctx.http_status, 429);
    }

    #[test]
    fn category_display() {
        assert_eq!(ErrorCategory::Network.to_string(), "network");
        assert_eq!(ErrorCategory::Resilience.to_string(), "resilience");
    }
}
