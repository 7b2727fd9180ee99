use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::gateway::GatewayCapability;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is alive", body = HealthStatus)),
    tag = "health"
)]
pub async fn health() -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyStatus {
    pub status: &'static str,
    pub gateway: &'static str,
}

/// Readiness probe: reports whether the payment gateway is configured. The
/// service still serves quotes and the email path without one.
#[utoipa::path(
    get,
    path = "/health/ready",
    responses((status = 200, description = "Readiness detail", body = ReadyStatus)),
    tag = "health"
)]
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let gateway = match state.gateway_capability {
        GatewayCapability::Available => "available",
        GatewayCapability::Unavailable => "unconfigured",
    };
    (
        StatusCode::OK,
        Json(ReadyStatus {
            status: "ok",
            gateway,
        }),
    )
}
