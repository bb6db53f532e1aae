//! Error types for adapters

use exchange_core::LookupError;
use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Provider answered with a non-success status
    #[error("Provider API error {status_code}: {message}")]
    ProviderApi {
        /// HTTP status code
        status_code: u16,
        /// Response body
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Provider has no record for the ISBN
    #[error("No record for ISBN {0}")]
    NotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Decode(err.to_string())
        } else {
            Error::Connection(err.to_string())
        }
    }
}

impl From<Error> for LookupError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) => LookupError::NotFound,
            Error::Decode(message) => LookupError::Decode(message),
            other => LookupError::Transport(other.to_string()),
        }
    }
}
