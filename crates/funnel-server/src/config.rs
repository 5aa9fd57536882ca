//! Server Configuration
//!
//! Everything the process reads from the environment, parsed once at
//! startup. Missing provider or store credentials are not fatal: the
//! affected endpoints answer with a configuration error instead.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use funnel_core::SupabaseConfig;
use funnel_payments::{AsaasConfig, AsaasEnvironment, DEFAULT_APPROVAL_DELAY};

/// Which gateway backs checkouts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaymentMode {
    /// Real Asaas checkouts
    Asaas,

    /// Offline demo: timer approvals and the manual status endpoint
    Simulation,
}

impl PaymentMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Asaas => "asaas",
            Self::Simulation => "simulation",
        }
    }
}

impl FromStr for PaymentMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asaas" => Ok(Self::Asaas),
            "simulation" | "simulated" => Ok(Self::Simulation),
            other => bail!("PAYMENT_MODE must be 'asaas' or 'simulation' (got {other:?})"),
        }
    }
}

/// Process configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub mode: PaymentMode,

    /// Asaas credentials; `None` when `ASAAS_API_KEY` is unset
    pub asaas: Option<AsaasConfig>,

    /// Hosted order store; `None` when either Supabase variable is unset
    pub supabase: Option<SupabaseConfig>,

    /// Shared secret expected in the webhook token header
    pub webhook_secret: Option<String>,

    pub webhook_path: String,
    pub frontend_url: String,

    /// Return page after checkout (`orderId` is appended per order)
    pub success_url: String,

    /// Simulated approval delay; `None` disables timer approvals
    pub approval_delay: Option<Duration>,

    pub checkout_due_days: u64,
    pub require_payer: bool,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = var("PAYMENT_MODE")
            .map(|v| v.parse::<PaymentMode>())
            .transpose()?
            .unwrap_or(PaymentMode::Asaas);

        let port = var("PORT")
            .map(|v| {
                v.parse::<u16>()
                    .with_context(|| format!("PORT must be a port number (got {v:?})"))
            })
            .transpose()?
            .unwrap_or(3000);

        let api_key = var("ASAAS_API_KEY");
        let environment = match var("ASAAS_IS_SANDBOX").as_deref() {
            Some("false") => AsaasEnvironment::Production,
            _ => AsaasEnvironment::Sandbox,
        };
        let asaas = api_key.clone().map(|key| AsaasConfig::new(key, environment));

        let supabase = match (var("SUPABASE_URL"), var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(key)) => Some(SupabaseConfig::new(url, key)?),
            _ => None,
        };

        let webhook_secret = var("WEBHOOK_SECRET_TOKEN").or(api_key);

        let webhook_path = var("WEBHOOK_PATH").unwrap_or_else(|| "/asaas-webhook".into());
        if !webhook_path.starts_with('/') {
            bail!("WEBHOOK_PATH must start with '/' (got {webhook_path:?})");
        }
        if crate::app::RESERVED_PATHS.contains(&webhook_path.as_str()) {
            bail!("WEBHOOK_PATH {webhook_path:?} collides with a built-in route");
        }

        let frontend_url = var("FRONTEND_URL")
            .unwrap_or_else(|| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();
        let success_url = var("SUCCESS_URL")
            .unwrap_or_else(|| format!("{frontend_url}/checkout-retorno?status=success"));

        let approval_delay = match var("SIMULATED_APPROVAL_DELAY_SECS") {
            Some(v) => {
                let secs: u64 = v.parse().with_context(|| {
                    format!("SIMULATED_APPROVAL_DELAY_SECS must be whole seconds (got {v:?})")
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => Some(DEFAULT_APPROVAL_DELAY),
        };

        let checkout_due_days = var("CHECKOUT_DUE_DAYS")
            .map(|v| {
                v.parse::<u64>()
                    .with_context(|| format!("CHECKOUT_DUE_DAYS must be a number (got {v:?})"))
            })
            .transpose()?
            .unwrap_or(3);

        let require_payer = match var("REQUIRE_PAYER_ID") {
            Some(v) => parse_flag(&v)
                .with_context(|| format!("REQUIRE_PAYER_ID must be true or false (got {v:?})"))?,
            None => mode == PaymentMode::Asaas,
        };

        Ok(Self {
            port,
            mode,
            asaas,
            supabase,
            webhook_secret,
            webhook_path,
            frontend_url,
            success_url,
            approval_delay,
            checkout_due_days,
            require_payer,
        })
    }

    pub const fn asaas_is_sandbox(&self) -> bool {
        match self.asaas {
            Some(ref asaas) => asaas.environment.is_sandbox(),
            None => true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
