//! # funnel-payments
//!
//! Checkout orchestration and payment webhook reconciliation for the
//! telehealth funnel.
//!
//! ## Checkout Flow
//!
//! ```text
//! ┌─────────────┐  create   ┌─────────────┐  redirect  ┌──────────────┐
//! │   Funnel    │──────────▶│  Our server │───────────▶│ Asaas hosted │
//! │  (browser)  │           │  (PENDING)  │            │   checkout   │
//! └─────────────┘           └─────────────┘            └──────────────┘
//!        ▲                         ▲                          │
//!        │ poll status             │ webhook (APPROVED)       │
//!        └─────────────────────────┴──────────────────────────┘
//! ```
//!
//! 1. `CheckoutOrchestrator` inserts a `PENDING` order and asks the
//!    `PaymentGateway` for a hosted session whose external reference is
//!    the order id.
//! 2. The provider notifies `PAYMENT_RECEIVED` / `PAYMENT_CONFIRMED`;
//!    `WebhookReconciler` approves the order, matching first by provider
//!    payment id and then by external reference.
//! 3. The customer's browser polls the order until it is `APPROVED`.
//!
//! ## Gateways
//!
//! - `AsaasClient` talks to the real provider (sandbox or production).
//! - `SimulatedGateway` approves orders on a timer for offline demos.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use funnel_payments::{CheckoutConfig, CheckoutOrchestrator, AsaasClient};
//!
//! let gateway = Arc::new(AsaasClient::from_env()?);
//! let config = CheckoutConfig::new("http://localhost:8080/checkout-retorno?status=success")?;
//! let orchestrator = CheckoutOrchestrator::new(store, gateway, config);
//!
//! let request = orchestrator.validate(payer, Some(&amount))?;
//! let outcome = orchestrator.create_checkout(request).await?;
//!
//! // Redirect user to: outcome.checkout_url
//! ```

mod asaas;
mod checkout;
mod error;
mod gateway;
mod simulated;
mod webhook;

pub use asaas::{AsaasClient, AsaasConfig, AsaasEnvironment};
pub use checkout::{CheckoutConfig, CheckoutOrchestrator, CheckoutOutcome, CheckoutRequest};
pub use error::{PaymentError, Result};
pub use gateway::{CheckoutSession, CheckoutSessionRequest, PaymentGateway};
pub use simulated::{DEFAULT_APPROVAL_DELAY, SimulatedGateway};
pub use webhook::{
    ACCESS_TOKEN_HEADER, MatchStrategy, PaymentNotice, Reconciliation, WebhookEvent, WebhookOutcome,
    WebhookReconciler, authenticate,
};
