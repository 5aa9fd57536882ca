//! Simulated Gateway
//!
//! Offline stand-in for the payment provider. The "checkout" sends the
//! customer straight to the return page, and a timer approves the order
//! after a fixed delay as if the provider webhook had arrived.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use funnel_core::{OrderFilter, OrderId, OrderPatch, OrderStatus, OrderStore};

use crate::error::Result;
use crate::gateway::{CheckoutSession, CheckoutSessionRequest, PaymentGateway};

/// Default delay before a simulated payment is approved
pub const DEFAULT_APPROVAL_DELAY: Duration = Duration::from_secs(5);

/// Simulated payment gateway
pub struct SimulatedGateway {
    store: Arc<dyn OrderStore>,
    approval_delay: Option<Duration>,
}

impl SimulatedGateway {
    /// Create a gateway that approves orders after `approval_delay`;
    /// `None` leaves orders pending until the manual status endpoint is used.
    pub fn new(store: Arc<dyn OrderStore>, approval_delay: Option<Duration>) -> Self {
        Self { store, approval_delay }
    }

    /// Simulated payment id: `sim_<first 8 chars of the order id>_<unix millis>`
    fn payment_id(order_id: &OrderId) -> String {
        let id = order_id.to_string();
        format!("sim_{}_{}", &id[..8], Utc::now().timestamp_millis())
    }

    fn schedule_approval(&self, order_id: OrderId) {
        let Some(delay) = self.approval_delay else {
            return;
        };
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let filter = OrderFilter::by_id(order_id).with_status_in(&[OrderStatus::Pending]);
            match store.update(&filter, &OrderPatch::status(OrderStatus::Approved)).await {
                Ok(Some(_)) => {
                    tracing::info!(order_id = %order_id, "Simulated payment approved");
                }
                Ok(None) => {
                    tracing::debug!(
                        order_id = %order_id,
                        "Simulated approval skipped, order no longer pending"
                    );
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "Simulated approval failed");
                }
            }
        });
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession> {
        let session = CheckoutSession {
            id: Some(Self::payment_id(&request.order_id)),
            url: request.success_redirect.clone(),
        };

        self.schedule_approval(request.order_id);

        tracing::info!(
            order_id = %request.order_id,
            checkout_id = ?session.id,
            delay_secs = ?self.approval_delay.map(|d| d.as_secs()),
            "Simulated checkout created"
        );

        Ok(session)
    }

    fn name(&self) -> &str {
        "simulation"
    }
}
