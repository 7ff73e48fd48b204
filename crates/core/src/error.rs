//! Error types for the Promptline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; [`Error`] is what the
//! invocation pipeline surfaces to callers.

use thiserror::Error;

/// The top-level error type for all Promptline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Setup-time errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Template error: {0}")]
    Template(String),

    // --- Order validation (raised before any network I/O) ---
    #[error("Invalid message order at index {index}: {message}")]
    Validation { index: usize, message: String },

    // --- Backend errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Backend contract violation: {0}")]
    ContractViolation(String),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Whether this error was raised by order validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Transient failures worth another attempt: timeouts, rate limiting,
    /// network faults and 5xx responses. Everything else is final.
    pub fn is_retriable(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Network(_) => true,
            ProviderError::ApiError { status_code, .. } => {
                *status_code >= 500 || *status_code == 408 || *status_code == 529
            }
            ProviderError::InvalidRequest(_)
            | ProviderError::AuthenticationFailed(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::NotConfigured(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Conversation lock poisoned: {0}")]
    LockPoisoned(String),
}
