//! Checkout and payment orchestration backend for a made-to-order instrument
//! workshop. Orders arrive from a cart snapshot or a legacy parameter set,
//! get revalidated against authoritative prices, and turn into hosted
//! payments (full, deposit or installment financing) at an external gateway.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod pricing;
pub mod rate_limiter;
pub mod services;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::config::AppConfig;
use crate::gateway::GatewayCapability;
use crate::rate_limiter::RateLimiter;
use crate::services::orchestrator::PaymentOrchestrator;
use crate::services::reconciliation::{PendingOrderStore, ReturnReconciler};

/// Standard success envelope returned by every endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub config: AppConfig,
    pub rate_limiter: RateLimiter,
    pub orchestrator: PaymentOrchestrator,
    pub reconciler: ReturnReconciler<Arc<dyn PendingOrderStore>>,
    pub gateway_capability: GatewayCapability,
}

/// Build the application router over a shared state.
pub fn app(state: Arc<AppState>) -> Router {
    handlers::api_routes()
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(openapi::ApiDoc::openapi()) }),
        )
        .with_state(state)
}
