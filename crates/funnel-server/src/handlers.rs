//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use funnel_core::{OrderId, OrderStatus, OrderSummary};
use funnel_payments::{
    ACCESS_TOKEN_HEADER, PaymentError, WebhookEvent, WebhookOutcome, authenticate,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub mode: &'static str,
    pub has_asaas_api_key: bool,
    pub asaas_is_sandbox: bool,
    pub has_supabase_config: bool,

    /// Webhooks can reach an order store
    pub webhook_configured: bool,

    /// A webhook token is required
    pub webhook_authenticated: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutBody {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub payer_identifier: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub success: bool,
    pub order_id: OrderId,
    pub checkout_url: String,
    pub checkout_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualStatusBody {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub success: bool,
    pub message: &'static str,
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// `PaymentError` rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PaymentError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match err {
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::Auth(_) => "UNAUTHORIZED",
            PaymentError::Provider { .. } => "PROVIDER_ERROR",
            PaymentError::Persistence(_) => "PERSISTENCE_ERROR",
            PaymentError::Config(_) => "CONFIG_ERROR",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::InvalidTransition { .. } => "INVALID_TRANSITION",
        };

        let body = match err {
            PaymentError::Auth(ref reason) => ErrorResponse {
                error: reason.clone(),
                details: None,
                code: code.into(),
            },
            PaymentError::Validation(ref reason) => ErrorResponse {
                error: err.user_message().into(),
                details: Some(reason.clone()),
                code: code.into(),
            },
            PaymentError::Provider { ref detail, .. } => ErrorResponse {
                error: err.user_message().into(),
                details: Some(detail.clone()),
                code: code.into(),
            },
            _ => ErrorResponse {
                error: err.user_message().into(),
                details: Some(err.to_string()),
                code: code.into(),
            },
        };

        (status, Json(body)).into_response()
    }
}

fn store_missing() -> ApiError {
    ApiError(PaymentError::Config(
        "Order store not configured (set SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY)".into(),
    ))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        mode: state.config.mode.as_str(),
        has_asaas_api_key: state.config.asaas.is_some(),
        asaas_is_sandbox: state.config.asaas_is_sandbox(),
        has_supabase_config: state.config.supabase.is_some(),
        webhook_configured: state.store.is_some(),
        webhook_authenticated: state.config.webhook_secret.is_some(),
    })
}

/// Create an order and its hosted checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CreateCheckoutBody>, JsonRejection>,
) -> Result<Json<CreateCheckoutResponse>, ApiError> {
    if state.store.is_none() {
        return Err(store_missing());
    }
    let orchestrator = state.orchestrator().ok_or_else(|| {
        ApiError(PaymentError::Config("Payment gateway not configured (set ASAAS_API_KEY)".into()))
    })?;

    let Json(body) = payload?;
    let payer = body.user_id.or(body.payer_identifier);
    let request = orchestrator.validate(payer, body.amount.as_ref())?;

    let outcome = orchestrator.create_checkout(request).await.map_err(|e| {
        tracing::error!(error = %e, "Checkout error");
        ApiError(e)
    })?;

    Ok(Json(CreateCheckoutResponse {
        success: true,
        order_id: outcome.order_id,
        checkout_url: outcome.checkout_url,
        checkout_id: outcome.provider_payment_id,
    }))
}

/// Payment provider webhook
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let token = headers.get(ACCESS_TOKEN_HEADER).and_then(|v| v.to_str().ok());
    authenticate(state.config.webhook_secret.as_deref(), token).inspect_err(|e| {
        tracing::warn!(error = %e, "Webhook rejected");
    })?;

    let event = WebhookEvent::parse(&body).inspect_err(|e| {
        tracing::warn!(error = %e, "Invalid webhook payload");
    })?;

    let Some(notice) = event.notice() else {
        tracing::info!(event = %event.name(), "Webhook event ignored");
        return Ok(Json(json!({ "message": "Event ignored" })));
    };

    let reconciler = state.reconciler().ok_or_else(store_missing)?;

    let response = match reconciler.handle(event.name(), notice).await? {
        WebhookOutcome::Reconciled { order, .. } => json!({
            "success": true,
            "message": "Webhook processed successfully",
            "order_id": order.id,
            "status": order.status,
        }),
        WebhookOutcome::Unmatched { .. } => json!({
            "message": "Order not found, but webhook processed",
            "warning": "Payment ID not linked to any order",
        }),
    };

    Ok(Json(response))
}

/// Manual status change (simulation mode only)
pub async fn manual_status(
    State(state): State<AppState>,
    payload: Result<Json<ManualStatusBody>, JsonRejection>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let Json(body) = payload?;
    let (Some(order_id), Some(status)) = (body.order_id, body.status) else {
        return Err(ApiError(PaymentError::Validation("orderId and status are required".into())));
    };

    let reconciler = state.reconciler().ok_or_else(store_missing)?;
    let order = reconciler.apply_manual_status(&order_id, &status).await?;

    Ok(Json(OrderStatusResponse {
        success: true,
        message: "Status updated",
        order_id: order.id,
        status: order.status,
    }))
}

/// Current order status, for polling clients
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrderSummary>, ApiError> {
    let order_id = OrderId::parse(&id).map_err(PaymentError::from)?;
    let store = state.store.as_ref().ok_or_else(store_missing)?;

    let order = store
        .get(&order_id)
        .await
        .map_err(PaymentError::from)?
        .ok_or_else(|| PaymentError::NotFound(order_id.to_string()))?;

    Ok(Json(OrderSummary::from(&order)))
}
