//! API Client
//!
//! Thin `reqwest` wrapper over the funnel server's public endpoints.

use funnel_core::{OrderId, OrderSummary};
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

#[derive(Debug, Serialize)]
struct CreateCheckoutBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    amount: Decimal,
}

/// Successful `POST /api/create-checkout` answer
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub order_id: OrderId,
    pub checkout_url: String,
    #[serde(default)]
    pub checkout_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Funnel server client
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    /// Start a checkout; redirect the customer to `checkout_url`
    pub async fn create_checkout(
        &self,
        payer_id: Option<&str>,
        amount: Decimal,
    ) -> Result<CheckoutResponse> {
        let response = self
            .client
            .post(self.endpoint("/api/create-checkout"))
            .json(&CreateCheckoutBody { user_id: payer_id, amount })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        Ok(response.json().await?)
    }

    /// Current state of an order; `None` when the server does not know it
    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<OrderSummary>> {
        let response = self
            .client
            .get(self.endpoint(&format!("/api/orders/{order_id}")))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(Self::api_error(response).await),
        }
    }

    async fn api_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let message = match (body.error, body.details) {
            (Some(error), Some(details)) => format!("{error}: {details}"),
            (Some(error), None) => error,
            (None, _) => "Request failed".into(),
        };

        ClientError::Api { status, message }
    }
}
