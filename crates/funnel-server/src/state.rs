//! Application State

use std::sync::Arc;

use funnel_core::{MemoryOrderStore, OrderStore, SupabaseOrderStore};
use funnel_payments::{
    AsaasClient, CheckoutConfig, CheckoutOrchestrator, PaymentGateway, SimulatedGateway,
    WebhookReconciler,
};

use crate::config::{Config, PaymentMode};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Order store (optional - None if not configured)
    pub store: Option<Arc<dyn OrderStore>>,

    /// Payment gateway (optional - None if not configured)
    pub gateway: Option<Arc<dyn PaymentGateway>>,

    pub checkout: CheckoutConfig,
}

impl AppState {
    /// Assemble state from already-built collaborators
    pub fn new(
        config: Config,
        store: Option<Arc<dyn OrderStore>>,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> anyhow::Result<Self> {
        let mut checkout = CheckoutConfig::new(&config.success_url)?;
        checkout.due_in_days = config.checkout_due_days;
        checkout.require_payer = config.require_payer;

        Ok(Self {
            config: Arc::new(config),
            store,
            gateway,
            checkout,
        })
    }

    /// Build the collaborators `config` asks for.
    ///
    /// Simulation mode falls back to an in-memory store when Supabase is not
    /// configured.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let store: Option<Arc<dyn OrderStore>> = match (config.supabase.clone(), config.mode) {
            (Some(supabase), _) => Some(Arc::new(SupabaseOrderStore::new(supabase)?)),
            (None, PaymentMode::Simulation) => Some(Arc::new(MemoryOrderStore::new())),
            (None, PaymentMode::Asaas) => None,
        };

        let gateway: Option<Arc<dyn PaymentGateway>> = match config.mode {
            PaymentMode::Asaas => match config.asaas.clone() {
                Some(asaas) => Some(Arc::new(AsaasClient::new(asaas)?)),
                None => None,
            },
            PaymentMode::Simulation => store.clone().map(|store| {
                let simulated = SimulatedGateway::new(store, config.approval_delay);
                Arc::new(simulated) as Arc<dyn PaymentGateway>
            }),
        };

        Self::new(config, store, gateway)
    }

    /// Orchestrator for one request, when both collaborators exist
    pub fn orchestrator(&self) -> Option<CheckoutOrchestrator> {
        let store = self.store.clone()?;
        let gateway = self.gateway.clone()?;
        Some(CheckoutOrchestrator::new(store, gateway, self.checkout.clone()))
    }

    pub fn reconciler(&self) -> Option<WebhookReconciler> {
        self.store.clone().map(WebhookReconciler::new)
    }

    pub fn store_name(&self) -> &str {
        self.store.as_ref().map_or("none", |s| s.name())
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.as_ref().map_or("none", |g| g.name())
    }
}
