//! # funnel-core
//!
//! Order model and order storage for the telehealth checkout funnel.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────────────┐
//! │  Checkout / Webhook  │─────▶│  OrderStore (trait)          │
//! │  Status poller       │      │   ├─ MemoryOrderStore        │
//! └──────────────────────┘      │   └─ SupabaseOrderStore      │
//!                               └──────────────────────────────┘
//! ```
//!
//! The store is the single source of truth and the only point of
//! cross-request synchronization: every write is an `update where ...`
//! scoped to one row, never a read-modify-write in the caller.

pub mod error;
pub mod order;
pub mod store;
pub mod supabase;

pub use error::{OrderError, Result};
pub use order::{NewOrder, Order, OrderId, OrderStatus, OrderSummary, parse_amount};
pub use store::{MemoryOrderStore, OrderFilter, OrderPatch, OrderStore};
pub use supabase::{ORDERS_SCHEMA, SupabaseConfig, SupabaseOrderStore, is_missing_table};
