//! Payment Gateway Strategy
//!
//! Common interface for creating hosted checkout sessions, so the
//! orchestrator works the same against the real provider or the simulator.

use async_trait::async_trait;
use chrono::NaiveDate;
use funnel_core::OrderId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Request to create a checkout session for one order
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutSessionRequest {
    /// Order being paid
    pub order_id: OrderId,

    /// Amount to charge
    pub amount: Decimal,

    /// Last day the charge can be paid
    pub due_date: NaiveDate,

    /// Echoed back by the provider in webhook notifications
    pub external_reference: String,

    /// Where the provider sends the customer after paying
    pub success_redirect: String,

    /// Label shown on the provider checkout page
    pub description: String,

    /// Provider customer id, when the payer is known
    pub customer: Option<String>,
}

/// Checkout session created by the provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider id for the session (may be absent in provider responses)
    pub id: Option<String>,

    /// URL to redirect the customer to
    pub url: String,
}

/// Payment gateway trait (Strategy pattern)
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession>;

    /// Gateway name
    fn name(&self) -> &str;
}
