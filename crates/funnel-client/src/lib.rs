//! # funnel-client
//!
//! Client side of the checkout funnel: a typed HTTP client for the funnel
//! server and the order status poller used on the payment return page.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use funnel_client::{ApiClient, PollerConfig, StatusPoller};
//!
//! let api = Arc::new(ApiClient::new("http://localhost:3000")?);
//! let checkout = api.create_checkout(None, dec!(187.00)).await?;
//!
//! let poller = StatusPoller::new(api, PollerConfig::default());
//! let handle = poller.start(checkout.order_id, |status| {
//!     println!("order is now {status}");
//! });
//!
//! // Ends on APPROVED, after 120 attempts, or on handle.stop()
//! let outcome = handle.join().await;
//! ```

pub mod api;
pub mod error;
pub mod poller;

pub use api::{ApiClient, CheckoutResponse};
pub use error::{ClientError, Result};
pub use poller::{
    Clock, PollHandle, PollOutcome, PollSnapshot, PollerConfig, StatusPoller, StatusSource,
        StoreStatusSource, TIMED_OUT, TokioClock,
};
