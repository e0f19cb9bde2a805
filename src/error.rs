//! Error types for codesandbox

use thiserror::Error;

/// Result type alias using codesandbox's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for codesandbox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No idle sandbox and the pool may not grow any further
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// A blocked acquisition was interrupted (pool shutdown)
    #[error("Acquisition interrupted: {0}")]
    Interrupted(String),

    /// The sandbox runtime could not create or reach a container
    #[error("Sandbox runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Docker/container error
    #[error("Container error: {0}")]
    Container(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::CapacityExceeded(_) | Error::RuntimeUnavailable(_) | Error::Container(_)
        )
    }

    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Container(err.to_string())
    }
}
