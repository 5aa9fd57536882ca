//! Client Error Types

use funnel_core::OrderError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors seen by funnel clients
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure or unreadable response
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with an error status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Direct store read failed
    #[error("Store error: {0}")]
    Store(#[from] OrderError),

    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
}
