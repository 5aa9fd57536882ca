//! Router assembly

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::PaymentMode;
use crate::handlers::{create_checkout, get_order, health_check, manual_status, payment_webhook};
use crate::state::AppState;

/// Fixed routes; the configurable webhook path may not reuse them
pub const RESERVED_PATHS: [&str; 3] = ["/health", "/api/create-checkout", "/payment-webhook"];

pub fn build_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health & info
        .route("/health", get(health_check))

        // Checkout & status
        .route("/api/create-checkout", post(create_checkout))
        .route("/api/orders/{id}", get(get_order))

        // Provider webhook
        .route(&state.config.webhook_path, post(payment_webhook));

    if state.config.mode == PaymentMode::Simulation {
        router = router.route("/payment-webhook", post(manual_status));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
