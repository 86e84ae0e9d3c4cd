//! Application State

use std::sync::Arc;

use market_catalog::{
    ContractResolver, CustomerDirectory, SiteNavigation, StandardAgreement, TierService,
};
use market_core::Store;
use market_payments::{CheckoutFlow, FlowConfig, PaymentGateway, StripeClient, WebhookHandler};

use crate::config::AppConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Backing store for users and profiles synced from the auth proxy
    pub store: Arc<dyn Store>,

    pub tiers: TierService,
    pub contracts: ContractResolver,
    pub customers: CustomerDirectory,
    pub navigation: SiteNavigation,

    /// Checkout flow (None if payments are not configured)
    pub checkout: Option<CheckoutFlow>,

    /// Stripe webhook handler (None if payments are not configured)
    pub webhooks: Option<Arc<WebhookHandler>>,

    flow_config: FlowConfig,
}

impl AppState {
    /// Catalog services only; call [`AppState::with_gateway`] to enable payments
    pub fn new(store: Arc<dyn Store>, config: &AppConfig) -> Self {
        let standard = StandardAgreement::new(config.standard_agreement_url.clone());
        Self {
            tiers: TierService::new(store.clone()).with_currency(config.currency.clone()),
            contracts: ContractResolver::new(store.clone(), standard),
            customers: CustomerDirectory::new(store.clone()),
            navigation: SiteNavigation::new(store.clone()),
            checkout: None,
            webhooks: None,
            flow_config: FlowConfig {
                payment_timeout: config.payment_timeout,
                public_base_url: config.public_base_url.clone(),
            },
            store,
        }
    }

    /// Full state from configuration, wiring Stripe when its keys are present
    pub fn from_config(store: Arc<dyn Store>, config: &AppConfig) -> Self {
        let state = Self::new(store, config);
        match &config.stripe {
            Some(stripe) => {
                let client = StripeClient::new(&stripe.secret_key, &stripe.webhook_secret);
                state.with_gateway(Arc::new(client), &stripe.webhook_secret)
            }
            None => state,
        }
    }

    /// Enable checkout and webhooks through `gateway`
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>, webhook_secret: &str) -> Self {
        let flow = CheckoutFlow::new(
            self.store.clone(),
            self.contracts.clone(),
            gateway,
            self.flow_config.clone(),
        );
        self.webhooks = Some(Arc::new(WebhookHandler::new(flow.clone(), webhook_secret)));
        self.checkout = Some(flow);
        self
    }

    pub const fn payments_enabled(&self) -> bool {
        self.checkout.is_some()
    }
}
