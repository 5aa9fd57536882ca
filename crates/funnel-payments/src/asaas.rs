//! Asaas Checkout Integration
//!
//! Creates hosted checkouts through the Asaas v3 API. The customer picks
//! the billing type (PIX, boleto or card) on the Asaas page.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::gateway::{CheckoutSession, CheckoutSessionRequest, PaymentGateway};

const SANDBOX_BASE_URL: &str = "https://sandbox.asaas.com/api/v3";
const PRODUCTION_BASE_URL: &str = "https://www.asaas.com/api/v3";

/// Asaas environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AsaasEnvironment {
    Sandbox,
    Production,
}

impl AsaasEnvironment {
    pub const fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => SANDBOX_BASE_URL,
            Self::Production => PRODUCTION_BASE_URL,
        }
    }

    pub const fn is_sandbox(&self) -> bool {
        matches!(self, Self::Sandbox)
    }
}

/// Asaas client configuration
#[derive(Clone, Debug)]
pub struct AsaasConfig {
    /// API key, sent as the `access_token` header
    pub api_key: String,

    pub environment: AsaasEnvironment,

    /// API root override; defaults to the environment's URL
    pub base_url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl AsaasConfig {
    pub fn new(api_key: impl Into<String>, environment: AsaasEnvironment) -> Self {
        Self {
            api_key: api_key.into(),
            environment,
            base_url: None,
            timeout_secs: 30,
        }
    }

    /// Point the client at another API root (proxies, test servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_else(|| self.environment.base_url())
    }

    /// Create from environment variables.
    ///
    /// Sandbox is used unless `ASAAS_IS_SANDBOX` is exactly `false`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ASAAS_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PaymentError::Config("ASAAS_API_KEY not set".into()))?;
        let environment = match std::env::var("ASAAS_IS_SANDBOX").as_deref() {
            Ok("false") => AsaasEnvironment::Production,
            _ => AsaasEnvironment::Sandbox,
        };

        Ok(Self::new(api_key, environment))
    }
}

/// Body of `POST /checkouts`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCheckoutPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    customer: Option<&'a str>,
    billing_type: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    value: Decimal,
    due_date: String,
    description: &'a str,
    external_reference: &'a str,
    callback: CheckoutCallback<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutCallback<'a> {
    success_url: &'a str,
    auto_redirect: bool,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Error body returned by Asaas
#[derive(Debug, Default, Deserialize)]
struct AsaasErrorBody {
    #[serde(default)]
    errors: Vec<AsaasErrorItem>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AsaasErrorItem {
    #[serde(default)]
    description: Option<String>,
}

impl AsaasErrorBody {
    fn detail(self) -> String {
        self.errors
            .into_iter()
            .find_map(|e| e.description)
            .or(self.message)
            .unwrap_or_else(|| "Unknown Asaas error".into())
    }
}

/// Asaas API client
pub struct AsaasClient {
    client: Client,
    config: AsaasConfig,
}

impl AsaasClient {
    pub fn new(config: AsaasConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(AsaasConfig::from_env()?)
    }

    pub const fn environment(&self) -> AsaasEnvironment {
        self.config.environment
    }

    fn payload<'a>(
        request: &'a CheckoutSessionRequest,
        due_date: String,
    ) -> CreateCheckoutPayload<'a> {
        CreateCheckoutPayload {
            customer: request.customer.as_deref(),
            billing_type: "UNDEFINED",
            value: request.amount,
            due_date,
            description: &request.description,
            external_reference: &request.external_reference,
            callback: CheckoutCallback {
                success_url: &request.success_redirect,
                auto_redirect: true,
            },
        }
    }
}

#[async_trait]
impl PaymentGateway for AsaasClient {
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSession> {
        let url = format!("{}/checkouts", self.config.base_url());
        let payload = Self::payload(request, request.due_date.format("%Y-%m-%d").to_string());

        let response = self
            .client
            .post(&url)
            .header("access_token", &self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PaymentError::Provider {
                status: None,
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: AsaasErrorBody = response.json().await.unwrap_or_default();
            return Err(PaymentError::Provider {
                status: Some(status.as_u16()),
                detail: body.detail(),
            });
        }

        let checkout: CheckoutResponse = response.json().await.map_err(|e| PaymentError::Provider {
            status: None,
            detail: format!("unreadable checkout response: {e}"),
        })?;

        let checkout_url = checkout.url.ok_or_else(|| PaymentError::Provider {
            status: None,
            detail: "No checkout URL returned".into(),
        })?;

        tracing::info!(
            order_id = %request.order_id,
            checkout_id = ?checkout.id,
            sandbox = self.config.environment.is_sandbox(),
            "Asaas checkout created"
        );

        Ok(CheckoutSession {
            id: checkout.id,
            url: checkout_url,
        })
    }

    fn name(&self) -> &str {
        "asaas"
    }
}
