use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Telemetry store errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid argument: {field} - {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Upstream error: {status} - {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },
}

impl TelemetryError {
    /// Build an `InvalidArgument` error for the named field.
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TelemetryError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, timeouts and 5xx responses are retryable; argument
    /// errors, missing resources and 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Network { .. } | TelemetryError::Timeout { .. } => true,
            TelemetryError::Upstream { status, .. } => *status >= 500,
            TelemetryError::InvalidArgument { .. }
            | TelemetryError::NotFound { .. }
            | TelemetryError::InvalidResponse { .. } => false,
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for telemetry store operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;
