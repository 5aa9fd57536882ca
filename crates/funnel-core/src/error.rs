//! Error Types

use thiserror::Error;

use crate::order::OrderStatus;

/// Result type alias for order operations
pub type Result<T> = std::result::Result<T, OrderError>;

/// Order and order-store errors
#[derive(Error, Debug)]
pub enum OrderError {
    /// Caller input rejected before touching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store unavailable or the write was rejected
    #[error("Storage error: {0}")]
    Storage(String),

    /// Another order already holds this provider payment id
    #[error("Provider payment id already linked to another order: {0}")]
    DuplicatePaymentId(String),

    /// Order not found
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Status change not allowed by the order state machine
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Store credentials missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrderError {
    /// Whether the failure came from the store itself (as opposed to bad input)
    pub const fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::DuplicatePaymentId(_)
                | Self::Network(_)
                | Self::Serialization(_)
        )
    }
}
