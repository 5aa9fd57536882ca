//! Payment Error Types

use funnel_core::{OrderError, OrderStatus};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Checkout and webhook errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Malformed or missing caller input (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Webhook token missing or wrong (401)
    #[error("Unauthorized: {0}")]
    Auth(String),

    /// Payment provider rejected or failed the request
    #[error("Payment provider error: {detail}")]
    Provider { status: Option<u16>, detail: String },

    /// Order store unavailable or write failed (500)
    #[error("Persistence error: {0}")]
    Persistence(#[source] OrderError),

    /// Required collaborator credentials missing (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Order not found (404)
    #[error("Order not found: {0}")]
    NotFound(String),

    /// Status change refused by the order state machine (409)
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl From<OrderError> for PaymentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Validation(msg) => Self::Validation(msg),
            OrderError::NotFound(id) => Self::NotFound(id),
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            OrderError::Config(msg) => Self::Config(msg),
            other => Self::Persistence(other),
        }
    }
}

impl PaymentError {
    /// HTTP status this error maps to
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth(_) => 401,
            Self::NotFound(_) => 404,
            Self::InvalidTransition { .. } => 409,
            Self::Provider { status, .. } => status
                .filter(|s| (400..=599).contains(s))
                .unwrap_or(502),
            Self::Persistence(_) | Self::Config(_) => 500,
        }
    }

    /// Whether a redelivery of the same request may succeed later.
    ///
    /// Only store failures qualify; they surface as 5xx so the provider
    /// retries webhook delivery.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Get user-friendly message
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid request.",
            Self::Auth(_) => "Unauthorized",
            Self::Provider { .. } => "Failed to create checkout with the payment provider.",
            Self::Persistence(_) => "Failed to save the order.",
            Self::Config(_) => "Service configuration error.",
            Self::NotFound(_) => "Order not found.",
            Self::InvalidTransition { .. } => "Order status cannot be changed.",
        }
    }
}
