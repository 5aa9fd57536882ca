//! Checkout Orchestration
//!
//! Creates the order, asks the gateway for a hosted checkout session and
//! links the two. A retried client call creates a second order; requests are
//! not deduplicated.

use std::sync::Arc;

use chrono::{Days, Utc};
use funnel_core::{
    NewOrder, OrderFilter, OrderId, OrderPatch, OrderStatus, OrderStore, parse_amount,
};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{PaymentError, Result};
use crate::gateway::{CheckoutSessionRequest, PaymentGateway};

/// Checkout behaviour for one deployment
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// Return page; `orderId=<id>` is appended per order
    pub success_url: Url,

    /// Days until the provider charge is due
    pub due_in_days: u64,

    /// Reject checkouts without a payer identifier
    pub require_payer: bool,
}

impl CheckoutConfig {
    pub fn new(success_url: &str) -> Result<Self> {
        let success_url = Url::parse(success_url)
            .map_err(|e| {
                PaymentError::Config(format!("invalid success URL {success_url:?}: {e}"))
            })?;

        Ok(Self {
            success_url,
            due_in_days: 3,
            require_payer: false,
        })
    }

    /// Success redirect for one order
    pub fn success_redirect(&self, order_id: &OrderId) -> String {
        let mut url = self.success_url.clone();
        url.query_pairs_mut().append_pair("orderId", &order_id.to_string());
        url.to_string()
    }
}

/// Validated checkout request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Payer identifier (provider customer id or user UUID)
    pub payer_id: Option<String>,

    pub amount: Decimal,
}

/// Result of a successful checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutOutcome {
    pub order_id: OrderId,
    pub checkout_url: String,
    pub provider_payment_id: Option<String>,
}

/// Checkout orchestrator
pub struct CheckoutOrchestrator {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: CheckoutConfig,
}

impl CheckoutOrchestrator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: CheckoutConfig,
    ) -> Self {
        Self { store, gateway, config }
    }

    /// Validate raw caller input
    pub fn validate(
        &self,
        payer: Option<String>,
        amount: Option<&serde_json::Value>,
    ) -> Result<CheckoutRequest> {
        let payer_id = payer.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

        if self.config.require_payer && payer_id.is_none() {
            return Err(PaymentError::Validation("user_id and amount are required".into()));
        }
        let amount = parse_amount(amount)?;

        Ok(CheckoutRequest { payer_id, amount })
    }

    /// Create an order and its checkout session
    pub async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome> {
        tracing::info!(payer_id = ?request.payer_id, amount = %request.amount, "Creating checkout");

        let order = self
            .store
            .insert(NewOrder::pending(request.amount, request.payer_id.as_deref()))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create order");
                PaymentError::Persistence(e)
            })?;

        tracing::info!(order_id = %order.id, amount = %order.amount, "Order created");

        let today = Utc::now().date_naive();
        let session_request = CheckoutSessionRequest {
            order_id: order.id,
            amount: order.amount,
            due_date: today.checked_add_days(Days::new(self.config.due_in_days)).unwrap_or(today),
            external_reference: order.external_reference(),
            success_redirect: self.config.success_redirect(&order.id),
            description: format!("Pedido #{}", order.id),
            customer: request.payer_id,
        };

        let session = match self.gateway.create_checkout_session(&session_request).await {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(
                    order_id = %order.id,
                    gateway = self.gateway.name(),
                    error = %err,
                    "Checkout session creation failed"
                );
                self.mark_failed(order.id).await;
                return Err(err);
            }
        };

        if let Some(ref payment_id) = session.id {
            self.link_payment(order.id, payment_id).await;
        }

        Ok(CheckoutOutcome {
            order_id: order.id,
            checkout_url: session.url,
            provider_payment_id: session.id,
        })
    }

    /// Best-effort: a failure here is logged, never retried
    async fn mark_failed(&self, order_id: OrderId) {
        let filter = OrderFilter::by_id(order_id).with_status_in(&[OrderStatus::Pending]);
        if let Err(e) = self.store.update(&filter, &OrderPatch::status(OrderStatus::Failed)).await {
            tracing::warn!(order_id = %order_id, error = %e, "Could not mark order as FAILED");
        }
    }

    /// Best-effort: the webhook falls back to the external reference when
    /// this link is missing
    async fn link_payment(&self, order_id: OrderId, payment_id: &str) {
        let patch = OrderPatch::provider_payment_id(payment_id);
        match self.store.update(&OrderFilter::by_id(order_id), &patch).await {
            Ok(Some(_)) => {
                tracing::info!(
                    order_id = %order_id,
                    provider_payment_id = %payment_id,
                    "Provider payment id saved"
                );
            }
            Ok(None) => {
                tracing::warn!(
                    order_id = %order_id,
                    provider_payment_id = %payment_id,
                    "Order vanished before payment id was saved"
                );
            }
            Err(e) => {
                tracing::warn!(
                    order_id = %order_id,
                    provider_payment_id = %payment_id,
                    error = %e,
                    "Could not save provider payment id"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CheckoutSession;
    use async_trait::async_trait;
    use funnel_core::{MemoryOrderStore, Order, OrderError};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records requests and answers with a fixed result
    struct FakeGateway {
        fail_with: Option<u16>,
        requests: Mutex<Vec<CheckoutSessionRequest>>,
    }

    impl FakeGateway {
        fn ok() -> Self {
            Self { fail_with: None, requests: Mutex::new(Vec::new()) }
        }

        fn failing(status: u16) -> Self {
            Self { fail_with: Some(status), requests: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_checkout_session(
            &self,
            request: &CheckoutSessionRequest,
        ) -> Result<CheckoutSession> {
            self.requests.lock().unwrap().push(request.clone());
            match self.fail_with {
                Some(status) => Err(PaymentError::Provider {
                    status: Some(status),
                    detail: "O campo customer deve ser informado.".into(),
                }),
                None => Ok(CheckoutSession {
                    id: Some("chk_123".into()),
                    url: "https://sandbox.asaas.com/checkoutSession/show?id=chk_123".into(),
                }),
            }
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    /// Memory store whose updates always fail
    struct ReadOnlyStore(MemoryOrderStore);

    #[async_trait]
    impl OrderStore for ReadOnlyStore {
        async fn insert(&self, order: NewOrder) -> funnel_core::Result<Order> {
            self.0.insert(order).await
        }

        async fn update(
            &self,
            _: &OrderFilter,
            _: &OrderPatch,
        ) -> funnel_core::Result<Option<Order>> {
            Err(OrderError::Storage("read-only replica".into()))
        }

        async fn get(&self, id: &OrderId) -> funnel_core::Result<Option<Order>> {
            self.0.get(id).await
        }

        fn name(&self) -> &str {
            "read-only"
        }
    }

    fn config() -> CheckoutConfig {
        CheckoutConfig::new("http://localhost:8080/checkout-retorno?status=success").unwrap()
    }

    #[tokio::test]
    async fn test_checkout_creates_pending_order_and_links_payment() {
        let store = Arc::new(MemoryOrderStore::new());
        let gateway = Arc::new(FakeGateway::ok());
        let orchestrator = CheckoutOrchestrator::new(store.clone(), gateway.clone(), config());

        let request = orchestrator.validate(None, Some(&json!(187.00))).unwrap();
        let outcome = orchestrator.create_checkout(request).await.unwrap();

        assert_eq!(store.len().await, 1);
        let order = store.get(&outcome.order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount, dec!(187.00));
        assert_eq!(order.provider_payment_id.as_deref(), Some("chk_123"));
        assert_eq!(outcome.provider_payment_id.as_deref(), Some("chk_123"));

        let sent = gateway.requests.lock().unwrap()[0].clone();
        assert_eq!(sent.external_reference, order.id.to_string());
        assert_eq!(
            sent.success_redirect,
            format!("http://localhost:8080/checkout-retorno?status=success&orderId={}", order.id)
        );
        assert_eq!(sent.due_date, Utc::now().date_naive() + Days::new(3));
    }

    #[tokio::test]
    async fn test_invalid_amount_creates_no_order() {
        let store = Arc::new(MemoryOrderStore::new());
        let orchestrator =
            CheckoutOrchestrator::new(store.clone(), Arc::new(FakeGateway::ok()), config());

        for amount in [json!(0), json!(-10.5), json!("abc")] {
            let result = orchestrator.validate(Some("user".into()), Some(&amount));
            assert!(matches!(result, Err(PaymentError::Validation(_))));
        }
        assert!(matches!(orchestrator.validate(None, None), Err(PaymentError::Validation(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_payer_required_when_configured() {
        let mut config = config();
        config.require_payer = true;
        let orchestrator = CheckoutOrchestrator::new(
            Arc::new(MemoryOrderStore::new()),
            Arc::new(FakeGateway::ok()),
            config,
        );

        let result = orchestrator.validate(Some("  ".into()), Some(&json!(10)));
        assert!(matches!(result, Err(PaymentError::Validation(_))));
        assert!(orchestrator.validate(Some("cus_1".into()), Some(&json!(10))).is_ok());
    }

    #[tokio::test]
    async fn test_provider_failure_marks_order_failed() {
        let store = Arc::new(MemoryOrderStore::new());
        let gateway = Arc::new(FakeGateway::failing(400));
        let orchestrator = CheckoutOrchestrator::new(store.clone(), gateway, config());

        let request = orchestrator.validate(None, Some(&json!(99.9))).unwrap();
        let err = orchestrator.create_checkout(request).await.unwrap_err();

        assert!(matches!(
            err,
            PaymentError::Provider { status: Some(400), ref detail } if detail.contains("customer")
        ));
        assert_eq!(store.len().await, 1);

        let orders = store.all().await;
        assert_eq!(orders[0].status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_link_failure_does_not_fail_checkout() {
        let store = Arc::new(ReadOnlyStore(MemoryOrderStore::new()));
        let orchestrator =
            CheckoutOrchestrator::new(store.clone(), Arc::new(FakeGateway::ok()), config());

        let request = orchestrator.validate(None, Some(&json!("25"))).unwrap();
        let outcome = orchestrator.create_checkout(request).await.unwrap();

        let order = store.get(&outcome.order_id).await.unwrap().unwrap();
        assert!(order.provider_payment_id.is_none());
        assert_eq!(
            outcome.checkout_url,
            "https://sandbox.asaas.com/checkoutSession/show?id=chk_123"
        );
    }
}
