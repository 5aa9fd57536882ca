//! Order Model
//!
//! The order record, its status state machine and amount validation.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrderError, Result};

/// Opaque order identifier (UUID), assigned by the store on insert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the textual form used in URLs and provider references
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| OrderError::Validation(format!("invalid order id: {s}")))
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for OrderId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment lifecycle of an order.
///
/// `Pending` is the initial state; the other three are terminal. The
/// Portuguese aliases belong to the deprecated `pedidos` schema and are only
/// accepted when reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[serde(alias = "pendente")]
    Pending,
    #[serde(alias = "pago")]
    Approved,
    #[serde(alias = "falhou")]
    Failed,
    #[serde(alias = "cancelado")]
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether an order currently in `self` may be written with `next`.
    ///
    /// Re-writing the same status is always allowed (idempotent delivery);
    /// a terminal status is never replaced by a different one.
    pub fn can_transition_to(&self, next: Self) -> bool {
        *self == next || *self == Self::Pending
    }

    /// Statuses from which an order may be written with `next`
    pub fn sources_for(next: Self) -> Vec<Self> {
        if next == Self::Pending {
            vec![Self::Pending]
        } else {
            vec![Self::Pending, next]
        }
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" | "PENDENTE" => Ok(Self::Pending),
            "APPROVED" | "PAGO" => Ok(Self::Approved),
            "FAILED" | "FALHOU" => Ok(Self::Failed),
            "CANCELLED" | "CANCELADO" => Ok(Self::Cancelled),
            other => Err(OrderError::Validation(format!("unknown order status: {other}"))),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order row as stored in the `orders` table
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique, immutable identifier
    pub id: OrderId,

    /// Payer, when a valid UUID was supplied at checkout
    #[serde(rename = "user_id", default)]
    pub payer_id: Option<Uuid>,

    /// Amount in BRL, fixed at creation
    pub amount: Decimal,

    /// Current payment status
    pub status: OrderStatus,

    /// Id assigned by the payment provider (checkout or charge id)
    #[serde(rename = "asaas_payment_id", default)]
    pub provider_payment_id: Option<String>,

    /// Human-readable label
    #[serde(default)]
    pub description: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Refreshed on every update
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Reference sent to the payment provider and echoed back in webhooks
    pub fn external_reference(&self) -> String {
        self.id.to_string()
    }
}

/// Public view of an order, as served to polling clients
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub provider_payment_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            amount: order.amount,
            provider_payment_id: order.provider_payment_id.clone(),
            updated_at: order.updated_at,
        }
    }
}

/// Data needed to insert a new order
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    #[serde(rename = "user_id")]
    pub payer_id: Option<Uuid>,
    pub amount: Decimal,
    pub description: String,
}

impl NewOrder {
    /// Build a pending order for a validated amount.
    ///
    /// The payer is kept only when it is a UUID (the column type); any other
    /// identifier is still usable as the provider customer id.
    pub fn pending(amount: Decimal, payer: Option<&str>) -> Self {
        Self {
            payer_id: payer.and_then(|p| Uuid::parse_str(p.trim()).ok()),
            amount,
            description: describe_amount(amount),
        }
    }

    /// Materialize into a full row with the given id and timestamp
    pub fn into_order(self, id: OrderId, now: DateTime<Utc>) -> Order {
        Order {
            id,
            payer_id: self.payer_id,
            amount: self.amount,
            status: OrderStatus::Pending,
            provider_payment_id: None,
            description: Some(self.description),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Label stored with every order
pub fn describe_amount(amount: Decimal) -> String {
    format!("Pedido de R$ {amount:.2}")
}

/// Validate a checkout amount taken straight from a JSON body.
///
/// Accepts JSON numbers and numeric strings; rejects missing, non-numeric
/// and non-positive values.
pub fn parse_amount(value: Option<&serde_json::Value>) -> Result<Decimal> {
    let amount = match value {
        None | Some(serde_json::Value::Null) => {
            return Err(OrderError::Validation("amount is required".into()));
        }
        Some(serde_json::Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(serde_json::Value::String(s)) => parse_decimal(s),
        Some(_) => None,
    }
    .ok_or_else(|| OrderError::Validation("amount must be a positive number".into()))?;

    if amount <= Decimal::ZERO {
        return Err(OrderError::Validation("amount must be a positive number".into()));
    }

    Ok(amount)
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}
