//! Payment Webhook Handling
//!
//! Authenticates provider notifications, parses them into `WebhookEvent` at
//! the boundary, and reconciles payment confirmations against the order
//! store.

use std::sync::Arc;

use funnel_core::{Order, OrderError, OrderFilter, OrderId, OrderPatch, OrderStatus, OrderStore};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{PaymentError, Result};

/// Header carrying the shared webhook secret
pub const ACCESS_TOKEN_HEADER: &str = "asaas-access-token";

/// Statuses a payment confirmation may be applied to
const RECONCILABLE: [OrderStatus; 2] = [OrderStatus::Pending, OrderStatus::Approved];

/// Check the webhook token against the configured secret.
///
/// With no secret configured every request passes.
pub fn authenticate(secret: Option<&str>, token: Option<&str>) -> Result<()> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    let Some(token) = token else {
        return Err(PaymentError::Auth("Token required".into()));
    };

    // Compare fixed-size digests rather than the raw strings
    if Sha256::digest(token.as_bytes()) == Sha256::digest(secret.as_bytes()) {
        Ok(())
    } else {
        Err(PaymentError::Auth("Invalid token".into()))
    }
}

/// Payment identifiers carried by a confirmation event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentNotice {
    /// Provider payment id (`payment.id`)
    pub payment_id: String,

    /// Our order id as echoed by the provider (`payment.externalReference`)
    pub external_reference: Option<String>,

    /// Provider-side payment status, for logs only
    pub provider_status: Option<String>,
}

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// `PAYMENT_RECEIVED`
    PaymentReceived(PaymentNotice),

    /// `PAYMENT_CONFIRMED`
    PaymentConfirmed(PaymentNotice),

    /// Any other event; acknowledged without touching the store
    Ignored { event: String },
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    payment: Option<RawPayment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayment {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    external_reference: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl WebhookEvent {
    /// Parse and validate a raw notification body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let raw: RawNotification = serde_json::from_slice(body)
            .map_err(|e| PaymentError::Validation(format!("Invalid payload: {e}")))?;

        let (Some(event), Some(payment)) = (non_empty(raw.event), raw.payment) else {
            return Err(PaymentError::Validation(
                "Invalid payload: event and payment are required".into(),
            ));
        };

        if !matches!(event.as_str(), "PAYMENT_RECEIVED" | "PAYMENT_CONFIRMED") {
            return Ok(Self::Ignored { event });
        }

        let payment_id = non_empty(payment.id)
            .ok_or_else(|| PaymentError::Validation("Missing payment id".into()))?;
        let notice = PaymentNotice {
            payment_id,
            external_reference: non_empty(payment.external_reference),
            provider_status: payment.status,
        };

        Ok(if event == "PAYMENT_RECEIVED" {
            Self::PaymentReceived(notice)
        } else {
            Self::PaymentConfirmed(notice)
        })
    }

    /// Provider event name
    pub fn name(&self) -> &str {
        match self {
            Self::PaymentReceived(_) => "PAYMENT_RECEIVED",
            Self::PaymentConfirmed(_) => "PAYMENT_CONFIRMED",
            Self::Ignored { event } => event.as_str(),
        }
    }

    pub const fn notice(&self) -> Option<&PaymentNotice> {
        match self {
            Self::PaymentReceived(notice) | Self::PaymentConfirmed(notice) => Some(notice),
            Self::Ignored { .. } => None,
        }
    }
}

/// How a notification was linked to its order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchStrategy {
    ProviderPaymentId,
    ExternalReference,
}

/// Result of trying to link a notification to an order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    Matched { order: Order, strategy: MatchStrategy },
    Unmatched,
}

/// What a payment confirmation did, for the HTTP response
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Reconciled {
        order: Order,
        strategy: MatchStrategy,
    },
    Unmatched {
        payment_id: String,
        external_reference: Option<String>,
    },
}

/// Webhook reconciler
pub struct WebhookReconciler {
    store: Arc<dyn OrderStore>,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Process the payment carried by a confirmation event.
    ///
    /// `event` is the provider event name, used for logs. Other events are
    /// acknowledged by the caller and never reach the store.
    pub async fn handle(&self, event: &str, notice: &PaymentNotice) -> Result<WebhookOutcome> {
        tracing::info!(
            event = %event,
            payment_id = %notice.payment_id,
            external_reference = ?notice.external_reference,
            provider_status = ?notice.provider_status,
            "Processing payment webhook"
        );

        match self.reconcile(notice).await {
            Ok(Reconciliation::Matched { order, strategy }) => {
                tracing::info!(
                    order_id = %order.id,
                    payment_id = %notice.payment_id,
                    strategy = ?strategy,
                    status = %order.status,
                    "Order approved"
                );
                Ok(WebhookOutcome::Reconciled { order, strategy })
            }
            Ok(Reconciliation::Unmatched) => {
                tracing::warn!(
                    event = %event,
                    payment_id = %notice.payment_id,
                    external_reference = ?notice.external_reference,
                    "No order linked to payment, needs manual follow-up"
                );
                Ok(WebhookOutcome::Unmatched {
                    payment_id: notice.payment_id.clone(),
                    external_reference: notice.external_reference.clone(),
                })
            }
            Err(err) => {
                tracing::error!(
                    event = %event,
                    payment_id = %notice.payment_id,
                    external_reference = ?notice.external_reference,
                    error = %err,
                    "Order update failed"
                );
                Err(err)
            }
        }
    }

    /// Approve the order a notice refers to.
    ///
    /// Tries the provider payment id first, then the external reference,
    /// backfilling the payment id on the second path.
    pub async fn reconcile(&self, notice: &PaymentNotice) -> Result<Reconciliation> {
        let by_payment =
            OrderFilter::by_provider_payment_id(&notice.payment_id).with_status_in(&RECONCILABLE);
        let approve = OrderPatch::status(OrderStatus::Approved);

        let updated = self.store.update(&by_payment, &approve).await;
        if let Some(order) = updated.map_err(PaymentError::Persistence)? {
            return Ok(Reconciliation::Matched {
                order,
                strategy: MatchStrategy::ProviderPaymentId,
            });
        }

        let Some(ref reference) = notice.external_reference else {
            return Ok(Reconciliation::Unmatched);
        };
        let Ok(order_id) = OrderId::parse(reference) else {
            tracing::warn!(
                external_reference = %reference,
                "External reference is not an order id"
            );
            return Ok(Reconciliation::Unmatched);
        };

        let by_reference = OrderFilter::by_id(order_id).with_status_in(&RECONCILABLE);
        let approve_and_link = approve.with_provider_payment_id(&notice.payment_id);

        match self.store.update(&by_reference, &approve_and_link).await {
            Ok(Some(order)) => Ok(Reconciliation::Matched {
                order,
                strategy: MatchStrategy::ExternalReference,
            }),
            Ok(None) => Ok(Reconciliation::Unmatched),
            Err(OrderError::DuplicatePaymentId(payment_id)) => {
                tracing::warn!(
                    order_id = %order_id,
                    payment_id = %payment_id,
                    "Payment id already linked to a different order"
                );
                Ok(Reconciliation::Unmatched)
            }
            Err(e) => Err(PaymentError::Persistence(e)),
        }
    }

    /// Set an order status by hand (simulation mode).
    ///
    /// Accepts `APPROVED`, `PENDING` or `FAILED`, and only moves an order
    /// along the state machine.
    pub async fn apply_manual_status(&self, order_id: &str, status: &str) -> Result<Order> {
        let order_id = OrderId::parse(order_id)?;
        let status: OrderStatus = status
            .parse()
            .ok()
            .filter(|s| {
                matches!(s, OrderStatus::Approved | OrderStatus::Pending | OrderStatus::Failed)
            })
            .ok_or_else(|| {
                PaymentError::Validation("Invalid status. Use APPROVED, PENDING or FAILED".into())
            })?;

        let filter = OrderFilter::by_id(order_id).with_status_in(&OrderStatus::sources_for(status));
        if let Some(order) = self.store.update(&filter, &OrderPatch::status(status)).await? {
            tracing::info!(order_id = %order.id, status = %order.status, "Manual status applied");
            return Ok(order);
        }

        match self.store.get(&order_id).await? {
            None => Err(PaymentError::NotFound(order_id.to_string())),
            Some(current) => Err(PaymentError::InvalidTransition {
                from: current.status,
                to: status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use funnel_core::{MemoryOrderStore, NewOrder};
    use rust_decimal_macros::dec;
    use serde_json::json;

    /// Store whose every call fails
    struct DownStore;

    #[async_trait]
    impl OrderStore for DownStore {
        async fn insert(&self, _: NewOrder) -> funnel_core::Result<Order> {
            Err(OrderError::Storage("connection refused".into()))
        }

        async fn update(
            &self,
            _: &OrderFilter,
            _: &OrderPatch,
        ) -> funnel_core::Result<Option<Order>> {
            Err(OrderError::Storage("connection refused".into()))
        }

        async fn get(&self, _: &OrderId) -> funnel_core::Result<Option<Order>> {
            Err(OrderError::Storage("connection refused".into()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn body(value: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    async fn pending_order(store: &MemoryOrderStore, payment_id: Option<&str>) -> Order {
        let order = store.insert(NewOrder::pending(dec!(187.00), None)).await.unwrap();
        match payment_id {
            Some(id) => store
                .update(&OrderFilter::by_id(order.id), &OrderPatch::provider_payment_id(id))
                .await
                .unwrap()
                .unwrap(),
            None => order,
        }
    }

    #[test]
    fn test_authenticate() {
        assert!(authenticate(None, None).is_ok());
        assert!(authenticate(Some(""), None).is_ok());
        assert!(authenticate(Some("s3cret"), Some("s3cret")).is_ok());
        assert!(matches!(authenticate(Some("s3cret"), None), Err(PaymentError::Auth(_))));
        assert!(matches!(authenticate(Some("s3cret"), Some("guess")), Err(PaymentError::Auth(_))));
    }

    #[test]
    fn test_parse_events() {
        let event = WebhookEvent::parse(&body(&json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {"id": "pay_123", "externalReference": "abc", "status": "CONFIRMED"}
        })))
        .unwrap();
        assert_eq!(
            event,
            WebhookEvent::PaymentConfirmed(PaymentNotice {
                payment_id: "pay_123".into(),
                external_reference: Some("abc".into()),
                provider_status: Some("CONFIRMED".into()),
            })
        );

        let event = WebhookEvent::parse(&body(&json!({
            "event": "PAYMENT_OVERDUE",
            "payment": {}
        })))
        .unwrap();
        assert_eq!(event, WebhookEvent::Ignored { event: "PAYMENT_OVERDUE".into() });
    }

    #[test]
    fn test_parse_rejects_malformed_payloads() {
        for payload in [
            json!({"payment": {"id": "pay_1"}}),
            json!({"event": "PAYMENT_RECEIVED"}),
            json!({"event": "", "payment": {"id": "pay_1"}}),
            json!({"event": "PAYMENT_RECEIVED", "payment": {"externalReference": "x"}}),
            json!({"event": "PAYMENT_RECEIVED", "payment": "pay_1"}),
        ] {
            let result = WebhookEvent::parse(&body(&payload));
            assert!(
                matches!(result, Err(PaymentError::Validation(_))),
                "{payload} should be rejected"
            );
        }
        assert!(matches!(WebhookEvent::parse(b"not json"), Err(PaymentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_match_by_provider_payment_id() {
        let store = Arc::new(MemoryOrderStore::new());
        let target = pending_order(&store, Some("pay_123")).await;
        let other = pending_order(&store, Some("pay_999")).await;
        let reconciler = WebhookReconciler::new(store.clone());

        let notice = PaymentNotice {
            payment_id: "pay_123".into(),
            external_reference: None,
            provider_status: None,
        };
        let outcome = reconciler.handle("PAYMENT_RECEIVED", &notice).await.unwrap();

        let WebhookOutcome::Reconciled { order, strategy } = outcome else {
            panic!("expected a reconciled order");
        };
        assert_eq!(order.id, target.id);
        assert_eq!(order.status, OrderStatus::Approved);
        assert_eq!(strategy, MatchStrategy::ProviderPaymentId);
        assert_eq!(store.get(&other.id).await.unwrap().unwrap().status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_fallback_to_external_reference_backfills_payment_id() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = pending_order(&store, Some("chk_abc")).await;
        let reconciler = WebhookReconciler::new(store.clone());

        let event = WebhookEvent::parse(&body(&json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {"id": "pay_123", "externalReference": order.id.to_string()}
        })))
        .unwrap();
        let notice = event.notice().unwrap();
        let outcome = reconciler.handle(event.name(), notice).await.unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Reconciled { strategy: MatchStrategy::ExternalReference, .. }
        ));
        let stored = store.get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Approved);
        assert_eq!(stored.provider_payment_id.as_deref(), Some("pay_123"));
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = pending_order(&store, None).await;
        let reconciler = WebhookReconciler::new(store.clone());
        let payload = body(&json!({
            "event": "PAYMENT_CONFIRMED",
            "payment": {"id": "pay_123", "externalReference": order.id.to_string()}
        }));

        let event = WebhookEvent::parse(&payload).unwrap();
        let notice = event.notice().unwrap();

        let first = reconciler.handle(event.name(), notice).await.unwrap();
        let second = reconciler.handle(event.name(), notice).await.unwrap();

        assert!(matches!(
            first,
            WebhookOutcome::Reconciled { strategy: MatchStrategy::ExternalReference, .. }
        ));
        assert!(matches!(
            second,
            WebhookOutcome::Reconciled { strategy: MatchStrategy::ProviderPaymentId, .. }
        ));
        assert_eq!(store.get(&order.id).await.unwrap().unwrap().status, OrderStatus::Approved);
    }

    #[tokio::test]
    async fn test_unmatched_and_terminal_orders() {
        let store = Arc::new(MemoryOrderStore::new());
        let failed = pending_order(&store, None).await;
        store
            .update(&OrderFilter::by_id(failed.id), &OrderPatch::status(OrderStatus::Failed))
            .await
            .unwrap();
        let reconciler = WebhookReconciler::new(store.clone());

        let unknown = PaymentNotice {
            payment_id: "pay_404".into(),
            external_reference: Some("not-an-order-id".into()),
            provider_status: None,
        };
        assert_eq!(reconciler.reconcile(&unknown).await.unwrap(), Reconciliation::Unmatched);

        let stale = PaymentNotice {
            payment_id: "pay_late".into(),
            external_reference: Some(failed.id.to_string()),
            provider_status: None,
        };
        let outcome = reconciler.handle("PAYMENT_CONFIRMED", &stale).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Unmatched { .. }));
        assert_eq!(store.get(&failed.id).await.unwrap().unwrap().status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_store_failure_is_retryable() {
        let reconciler = WebhookReconciler::new(Arc::new(DownStore));
        let notice = PaymentNotice {
            payment_id: "pay_1".into(),
            external_reference: None,
            provider_status: None,
        };

        let err = reconciler.handle("PAYMENT_CONFIRMED", &notice).await.unwrap_err();
        assert!(matches!(err, PaymentError::Persistence(_)));
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_manual_status() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = pending_order(&store, None).await;
        let reconciler = WebhookReconciler::new(store.clone());
        let id = order.id.to_string();

        let approved = reconciler.apply_manual_status(&id, "APPROVED").await.unwrap();
        assert_eq!(approved.status, OrderStatus::Approved);

        assert!(reconciler.apply_manual_status(&id, "APPROVED").await.is_ok());
        assert!(matches!(
            reconciler.apply_manual_status(&id, "PENDING").await,
            Err(PaymentError::InvalidTransition {
                from: OrderStatus::Approved,
                to: OrderStatus::Pending
            })
        ));
        assert!(matches!(
            reconciler.apply_manual_status(&id, "CANCELLED").await,
            Err(PaymentError::Validation(_))
        ));
        assert!(matches!(
            reconciler.apply_manual_status(&OrderId::new().to_string(), "FAILED").await,
            Err(PaymentError::NotFound(_))
        ));
    }
}
