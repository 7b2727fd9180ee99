//! Checkout quote endpoint.
//!
//! The informational counterpart to payment creation: resolves the order from
//! either entry path and returns the recomputed price breakdown. Rate-limited
//! fail-open, so a rate-limit backend outage degrades to the local counter
//! instead of refusing quotes.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::handlers::common::success_response;
use crate::models::order::{CartSnapshot, OrderItem, ShippingMethod};
use crate::rate_limiter::extract_client_ip;
use crate::services::aggregator::{self, AggregateOutcome, PriceQuote};
use crate::AppState;

const QUOTE_ENDPOINT: &str = "quote";

#[derive(Debug, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub cart_items: Option<Vec<OrderItem>>,
    /// Legacy URL parameters forwarded verbatim
    #[serde(default)]
    pub params: HashMap<String, String>,
    pub shipping_method: Option<ShippingMethod>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuoteOutcome {
    Quote(PriceQuote),
    /// Nothing to quote; the caller should send the customer to the catalog.
    RedirectToCatalog,
}

/// Quote an order without committing to anything.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Recomputed price breakdown", body = QuoteOutcome),
        (status = 429, description = "Rate limit exceeded")
    ),
    tag = "checkout"
)]
pub async fn quote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<QuoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let client_ip = extract_client_ip(&headers);
    let limits = &state.config.rate_limit;
    let decision = state
        .rate_limiter
        .check_and_increment(
            &client_ip,
            QUOTE_ENDPOINT,
            limits.quote_max_requests,
            Duration::from_secs(limits.quote_window_secs),
            false,
        )
        .await
        .map_err(|e| ServiceError::ServiceUnavailable(e.to_string()))?;
    if !decision.allowed {
        return Err(ServiceError::RateLimitExceeded);
    }

    let cart = request.cart_items.map(CartSnapshot::from_items);
    let outcome = match aggregator::aggregate(cart.as_ref(), &request.params) {
        AggregateOutcome::RedirectToCatalog => QuoteOutcome::RedirectToCatalog,
        AggregateOutcome::Order(source) => {
            let quote = aggregator::quote(&source, request.shipping_method, &state.config.pricing);
            QuoteOutcome::Quote(quote)
        }
    };
    Ok(success_response(outcome))
}
