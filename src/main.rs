use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use atelier_checkout_api::catalog::{CatalogProvider, InMemoryCatalog};
use atelier_checkout_api::config::{init_tracing, load_config};
use atelier_checkout_api::gateway::{GatewayCapability, PaymentGatewayClient};
use atelier_checkout_api::rate_limiter::RateLimiter;
use atelier_checkout_api::services::orchestrator::PaymentOrchestrator;
use atelier_checkout_api::services::reconciliation::{
    InMemoryPendingOrderStore, PendingOrderStore, ReturnReconciler,
};
use atelier_checkout_api::services::validation::PriceValidator;
use atelier_checkout_api::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);

    let catalog: Arc<dyn CatalogProvider> = match &config.catalog_path {
        Some(path) => Arc::new(
            InMemoryCatalog::from_file(path)
                .with_context(|| format!("failed to load catalog from {}", path))?,
        ),
        None => {
            warn!("no catalog seed configured, price validation will reject stock orders");
            Arc::new(InMemoryCatalog::new())
        }
    };

    let redis_client = Arc::new(
        redis::Client::open(config.redis_url.as_str())
            .context("invalid redis url")?,
    );
    let rate_limiter = RateLimiter::redis(redis_client, config.rate_limit.namespace.clone());

    let gateway = Arc::new(PaymentGatewayClient::new(&config.gateway)?);
    let gateway_capability = gateway.capability();
    if gateway_capability == GatewayCapability::Unavailable {
        warn!("payment gateway not configured, orders will route to the email path");
    }

    let pending: Arc<dyn PendingOrderStore> = Arc::new(InMemoryPendingOrderStore::new());
    let validator = PriceValidator::new(catalog, config.pricing.clone());
    let orchestrator = PaymentOrchestrator::new(
        validator,
        gateway,
        rate_limiter.clone(),
        pending.clone(),
        config.pricing.clone(),
        config.rate_limit.clone(),
        config.gateway.clone(),
    );
    let reconciler = ReturnReconciler::new(pending, config.pricing.currency.clone());

    let cors = if config.is_production() {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        rate_limiter,
        orchestrator,
        reconciler,
        gateway_capability,
        config,
    });

    let router = app(state).layer(cors).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "checkout api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to install the shutdown handler");
        return;
    }
    info!("shutdown signal received");
}
