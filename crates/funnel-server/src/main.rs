//! Telehealth funnel HTTP server
//!
//! Axum-based server for checkout creation, payment provider webhooks and
//! order status lookups.

mod app;
mod config;
mod handlers;
mod state;

use funnel_core::{ORDERS_SCHEMA, OrderStore, is_missing_table};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::build_router;
use crate::config::{Config, PaymentMode};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment first so RUST_LOG from .env applies
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let port = config.port;
    let webhook_path = config.webhook_path.clone();
    let mode = config.mode;

    if config.asaas.is_none() && mode == PaymentMode::Asaas {
        tracing::warn!("⚠ Asaas not configured - checkout disabled");
        tracing::warn!("  Set ASAAS_API_KEY in .env");
    }
    if config.supabase.is_none() {
        if mode == PaymentMode::Simulation {
            tracing::warn!("⚠ Supabase not configured - using in-memory orders");
        } else {
            tracing::warn!("⚠ Supabase not configured - checkout and webhooks disabled");
            tracing::warn!("  Set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY in .env");
        }
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("⚠ WEBHOOK_SECRET_TOKEN not set - webhook requests are not authenticated");
    }

    let state = AppState::from_config(config)?;
    tracing::info!(
        mode = mode.as_str(),
        store = state.store_name(),
        gateway = state.gateway_name(),
        sandbox = state.config.asaas_is_sandbox(),
        success_url = %state.config.success_url,
        frontend_url = %state.config.frontend_url,
        "✓ Collaborators ready"
    );

    if let Some(store) = state.store.as_ref() {
        match store.check().await {
            Ok(()) => tracing::info!(store = store.name(), "✓ Order store reachable"),
            Err(e) if is_missing_table(&e) => {
                tracing::warn!(
                    error = %e,
                    "⚠ Orders table missing - run this SQL in the Supabase SQL editor:"
                );
                tracing::warn!("\n{}", ORDERS_SCHEMA);
            }
            Err(e) => tracing::warn!(error = %e, "⚠ Order store check failed"),
        }
    }

    let app = build_router(state);

    // Start server
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 funnel server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health               - Health check");
    tracing::info!("  POST /api/create-checkout  - Create checkout");
    tracing::info!("  GET  /api/orders/{{id}}      - Order status");
    tracing::info!("  POST {:<22} - Payment webhook", webhook_path);
    if mode == PaymentMode::Simulation {
        tracing::info!("  POST /payment-webhook      - Manual status (simulation)");
    }

    axum::serve(listener, app).await?;

    Ok(())
}
