//! Supabase Order Store
//!
//! `OrderStore` backed by the hosted Postgres database, reached through its
//! PostgREST interface. Updates are single `PATCH` requests whose filters are
//! evaluated by Postgres, so each one is atomic per row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::error::{OrderError, Result};
use crate::order::{NewOrder, Order, OrderId, OrderStatus};
use crate::store::{OrderFilter, OrderPatch, OrderStore, ensure_scoped};

const PAYMENT_ID_COLUMN: &str = "asaas_payment_id";

/// DDL for the `orders` table, including the unique provider payment id
pub const ORDERS_SCHEMA: &str = include_str!("../sql/orders.sql");

/// Supabase connection configuration
#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Service-role key (bypasses row level security)
    pub service_role_key: String,

    /// Orders table name
    pub table: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, service_role_key: impl Into<String>) -> Result<Self> {
        let url = url.into().trim().trim_end_matches('/').to_string();
        let service_role_key = service_role_key.into().trim().to_string();

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(OrderError::Config(format!(
                "SUPABASE_URL must start with http:// or https:// (got {url:?})"
            )));
        }
        if service_role_key.is_empty() {
            return Err(OrderError::Config("SUPABASE_SERVICE_ROLE_KEY is empty".into()));
        }

        Ok(Self {
            url,
            service_role_key,
            table: "orders".into(),
            timeout_secs: 15,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| OrderError::Config("SUPABASE_URL not set".into()))?;
        let key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .map_err(|_| OrderError::Config("SUPABASE_SERVICE_ROLE_KEY not set".into()))?;

        Self::new(url, key)
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }
}

/// Error body returned by PostgREST
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// PostgREST-backed order store
pub struct SupabaseOrderStore {
    client: Client,
    config: SupabaseConfig,
    endpoint: String,
}

impl SupabaseOrderStore {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint(),
            client,
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(SupabaseConfig::from_env()?)
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.client
            .request(method, &self.endpoint)
            .header("apikey", &self.config.service_role_key)
            .bearer_auth(&self.config.service_role_key)
            .header("Prefer", "return=representation")
    }

    async fn rows(&self, response: reqwest::Response) -> Result<Vec<Order>> {
        let status = response.status();
        if !status.is_success() {
            let body: PostgrestError = response.json().await.unwrap_or_default();
            return Err(map_postgrest_error(&self.config.table, status, body));
        }

        Ok(response.json::<Vec<Order>>().await?)
    }
}

#[async_trait]
impl OrderStore for SupabaseOrderStore {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let now = Utc::now();
        let body = json!({
            "user_id": order.payer_id,
            "amount": order.amount,
            "status": OrderStatus::Pending,
            "description": order.description,
            "created_at": now,
            "updated_at": now,
        });

        let response = self.request(reqwest::Method::POST).json(&body).send().await?;
        let mut rows = self.rows(response).await?;

        if rows.is_empty() {
            return Err(OrderError::Storage("insert returned no row (missing order id)".into()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(&self, filter: &OrderFilter, patch: &OrderPatch) -> Result<Option<Order>> {
        ensure_scoped(filter)?;

        let response = self
            .request(reqwest::Method::PATCH)
            .query(&filter_query(filter))
            .json(&patch_body(patch))
            .send()
            .await?;
        let mut rows = self.rows(response).await?;

        if rows.len() > 1 {
            tracing::warn!(
                matched = rows.len(),
                filter = ?filter,
                "Order update matched more than one row"
            );
        }
        Ok((!rows.is_empty()).then(|| rows.swap_remove(0)))
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        let response = self
            .request(reqwest::Method::GET)
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .send()
            .await?;
        let mut rows = self.rows(response).await?;

        Ok((!rows.is_empty()).then(|| rows.swap_remove(0)))
    }

    /// Select one row to confirm the table exists
    async fn check(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET)
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body: PostgrestError = response.json().await.unwrap_or_default();
        Err(map_postgrest_error(&self.config.table, status, body))
    }

    fn name(&self) -> &str {
        "supabase"
    }
}

/// Translate a filter into PostgREST query parameters
fn filter_query(filter: &OrderFilter) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();

    if let Some(id) = filter.id {
        query.push(("id", format!("eq.{id}")));
    }
    if let Some(ref payment_id) = filter.provider_payment_id {
        query.push((PAYMENT_ID_COLUMN, format!("eq.{payment_id}")));
    }
    if let Some(ref statuses) = filter.status_in {
        let list = statuses.iter().map(OrderStatus::as_str).collect::<Vec<_>>().join(",");
        query.push(("status", format!("in.({list})")));
    }

    query
}

fn patch_body(patch: &OrderPatch) -> serde_json::Value {
    let mut body = json!({ "updated_at": Utc::now() });

    if let Some(status) = patch.status {
        body["status"] = json!(status);
    }
    if let Some(ref payment_id) = patch.provider_payment_id {
        body[PAYMENT_ID_COLUMN] = json!(payment_id);
    }

    body
}

/// Whether `err` means the orders table has not been created yet
pub fn is_missing_table(err: &OrderError) -> bool {
    matches!(err, OrderError::Storage(message) if message.contains(MISSING_TABLE_HINT))
}

const MISSING_TABLE_HINT: &str = "apply the orders schema in the Supabase dashboard";

fn map_postgrest_error(table: &str, status: StatusCode, body: PostgrestError) -> OrderError {
    let message = body.message.unwrap_or_else(|| status.to_string());

    match body.code.as_deref() {
        Some("23505") => OrderError::DuplicatePaymentId(body.details.unwrap_or(message)),
        Some("42P01" | "PGRST205") => {
            OrderError::Storage(format!("table \"{table}\" does not exist; {MISSING_TABLE_HINT}"))
        }
        _ if message.contains("does not exist") && message.contains("relation") => {
            OrderError::Storage(format!("table \"{table}\" does not exist; {MISSING_TABLE_HINT}"))
        }
        _ => OrderError::Storage(format!("{status}: {message}")),
    }
}
