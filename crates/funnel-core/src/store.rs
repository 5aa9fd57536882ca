//! Order Store
//!
//! The durable record of orders. Every mutation is a predicate-scoped
//! update ("update where ...") so concurrent writers converge without a
//! read-modify-write round trip in the caller.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{OrderError, Result};
use crate::order::{NewOrder, Order, OrderId, OrderStatus};

/// Row predicate for `OrderStore::update`.
///
/// All present conditions must hold. A filter must name either an order id
/// or a provider payment id; stores refuse unscoped updates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub id: Option<OrderId>,
    pub provider_payment_id: Option<String>,
    pub status_in: Option<Vec<OrderStatus>>,
}

impl OrderFilter {
    pub fn by_id(id: OrderId) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_provider_payment_id(payment_id: impl Into<String>) -> Self {
        Self {
            provider_payment_id: Some(payment_id.into()),
            ..Default::default()
        }
    }

    /// Restrict the match to orders currently in one of `statuses`
    #[must_use]
    pub fn with_status_in(mut self, statuses: &[OrderStatus]) -> Self {
        self.status_in = Some(statuses.to_vec());
        self
    }

    pub const fn is_scoped(&self) -> bool {
        self.id.is_some() || self.provider_payment_id.is_some()
    }

    pub fn matches(&self, order: &Order) -> bool {
        if self.id.is_some_and(|id| id != order.id) {
            return false;
        }
        if let Some(ref payment_id) = self.provider_payment_id {
            if order.provider_payment_id.as_deref() != Some(payment_id.as_str()) {
                return false;
            }
        }
        if let Some(ref statuses) = self.status_in {
            if !statuses.contains(&order.status) {
                return false;
            }
        }
        true
    }
}

/// Columns written by `OrderStore::update`; `updated_at` is always refreshed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub provider_payment_id: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn provider_payment_id(payment_id: impl Into<String>) -> Self {
        Self {
            provider_payment_id: Some(payment_id.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_provider_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.provider_payment_id = Some(payment_id.into());
        self
    }

    fn apply(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(ref payment_id) = self.provider_payment_id {
            order.provider_payment_id = Some(payment_id.clone());
        }
        order.updated_at = Utc::now();
    }
}

/// Order storage trait
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new `PENDING` order; the store assigns id and timestamps
    async fn insert(&self, order: NewOrder) -> Result<Order>;

    /// Atomically update the single order matching `filter`.
    ///
    /// Returns `Ok(None)` when no row matched.
    async fn update(&self, filter: &OrderFilter, patch: &OrderPatch) -> Result<Option<Order>>;

    /// Get order by id
    async fn get(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Verify the backend is reachable and its schema exists
    async fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Backend name for logs and health output
    fn name(&self) -> &str;
}

pub(crate) fn ensure_scoped(filter: &OrderFilter) -> Result<()> {
    if filter.is_scoped() {
        Ok(())
    } else {
        Err(OrderError::Validation(
            "refusing to update orders without an id or provider payment id".into(),
        ))
    }
}

/// In-memory order store (for development, simulation mode and tests)
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored orders
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// All stored orders, oldest first
    pub async fn all(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.read().await.values().cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let order = order.into_order(OrderId::new(), Utc::now());
        self.orders.write().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update(&self, filter: &OrderFilter, patch: &OrderPatch) -> Result<Option<Order>> {
        ensure_scoped(filter)?;

        // Match and mutate under one write lock so the update is atomic
        let mut orders = self.orders.write().await;

        let Some(id) = orders.values().find(|o| filter.matches(o)).map(|o| o.id) else {
            return Ok(None);
        };

        if let Some(ref payment_id) = patch.provider_payment_id {
            let taken = orders
                .values()
                .any(|o| {
                    o.id != id && o.provider_payment_id.as_deref() == Some(payment_id.as_str())
                });
            if taken {
                return Err(OrderError::DuplicatePaymentId(payment_id.clone()));
            }
        }

        let Some(order) = orders.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(order);

        Ok(Some(order.clone()))
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(id).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
