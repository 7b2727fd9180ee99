use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::AppState;

pub mod checkout;
pub mod common;
pub mod health;
pub mod payments;

/// Assemble the versioned API router.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest(
            "/api/v1/payments",
            Router::new()
                .route("/", post(payments::create_payment))
                .route("/return", get(payments::payment_return)),
        )
        .nest(
            "/api/v1/checkout",
            Router::new().route("/quote", post(checkout::quote)),
        )
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
}
