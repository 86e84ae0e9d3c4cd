//! market.dev HTTP Server
//!
//! Axum-based server for maintainer tier management, contract-gated
//! checkout with Stripe, and the customer/lead dashboards.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_core::MemoryStore;

use crate::config::AppConfig;
use crate::handlers::{
    add_prospect, attach_feature, checkout_status, checkout_view, create_contract,
    create_feature, create_page, create_tier, dashboard_customers, dashboard_leads,
    detach_feature, health_check, initiate_checkout, link_contract, list_site_tiers,
    list_user_tiers, set_page_draft, shortlist_prospect, site_navigation, stripe_webhook,
    tier_contract, update_tier, upsert_profile,
};
use crate::state::AppState;

fn app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & profile
        .route("/health", get(health_check))
        .route("/api/me", put(upsert_profile))

        // Tiers & features
        .route("/api/tiers", post(create_tier))
        .route("/api/tiers/{id}", patch(update_tier))
        .route("/api/users/{id}/tiers", get(list_user_tiers))
        .route("/api/sites/{id}/tiers", get(list_site_tiers))
        .route("/api/features", post(create_feature))
        .route(
            "/api/tiers/{id}/features/{feature_id}",
            put(attach_feature).delete(detach_feature),
        )

        // Contracts
        .route("/api/contracts", post(create_contract))
        .route("/api/tiers/{id}/contract", get(tier_contract).put(link_contract))

        // Checkout
        .route("/api/tiers/{id}/checkout", get(checkout_view))
        .route("/api/checkout", post(initiate_checkout))
        .route("/api/checkout/{id}", get(checkout_status))
        .route("/webhook/stripe", post(stripe_webhook))

        // Dashboard
        .route("/api/dashboard/customers", get(dashboard_customers))
        .route("/api/dashboard/leads", get(dashboard_leads))
        .route("/api/prospects", post(add_prospect))
        .route("/api/prospects/{id}/shortlist", put(shortlist_prospect))

        // Pages & navigation
        .route("/api/pages", post(create_page))
        .route("/api/pages/{id}/draft", put(set_page_draft))
        .route("/api/sites/{id}/navigation", get(site_navigation))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let store = Arc::new(MemoryStore::new());
    let state = AppState::from_config(store, &config);

    if state.payments_enabled() {
        tracing::info!(
            timeout_secs = config.payment_timeout.as_secs(),
            "✓ Stripe configured"
        );
    } else {
        tracing::warn!("⚠ Stripe not configured - checkout disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
    }
    tracing::info!(url = %config.standard_agreement_url, "Standard agreement");

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 market.dev server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");

    axum::serve(listener, app(state)).await?;

    Ok(())
}
