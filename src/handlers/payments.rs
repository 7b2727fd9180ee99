//! Payment endpoints: creation and the gateway return redirect.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response, validate_input};
use crate::models::order::{
    CartSnapshot, CustomerInfo, OrderData, OrderItem, OrderSource, PaymentType, PostalAddress,
    ShippingMethod,
};
use crate::rate_limiter::extract_client_ip;
use crate::services::orchestrator::{CreatePaymentCommand, PaymentResolution};
use crate::services::reconciliation::RedirectOutcome;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CustomerPayload {
    #[validate(email(message = "a valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last name is required"))]
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
}

impl From<CustomerPayload> for CustomerInfo {
    fn from(payload: CustomerPayload) -> Self {
        Self {
            email: payload.email,
            first_name: payload.first_name,
            last_name: payload.last_name,
            phone: payload.phone,
            address: payload.address,
        }
    }
}

/// Payment submission. Exactly one of `cart_items` (cart path) or `order`
/// (legacy single-item path) describes what is being bought.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePaymentRequest {
    #[validate]
    pub customer: CustomerPayload,
    pub cart_items: Option<Vec<OrderItem>>,
    pub order: Option<OrderData>,
    pub payment_type: PaymentType,
    pub shipping_method: Option<ShippingMethod>,
    /// Amount the customer agreed to pay, revalidated server-side
    pub amount: Decimal,
    pub reference: Option<String>,
    #[serde(default)]
    pub integrated: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentCreatedResponse {
    Payment {
        reference: String,
        payment_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        payment_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        payment_token: Option<String>,
        amount: Decimal,
        amount_formatted: String,
    },
    /// No card payment: the order is confirmed by email.
    EmailConfirmation { reference: String },
}

/// Create a payment session for an order.
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment session created", body = PaymentCreatedResponse),
        (status = 400, description = "Validation or price integrity failure"),
        (status = 429, description = "Rate limit exceeded"),
        (status = 502, description = "Payment gateway failure")
    ),
    tag = "payments"
)]
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&request)?;

    let source = resolve_source(request.cart_items, request.order)?;
    let client_ip = extract_client_ip(&headers);

    let command = CreatePaymentCommand {
        source,
        shipping: request.shipping_method,
        payment_type: request.payment_type,
        customer: request.customer.into(),
        declared_amount: request.amount,
        reference: request.reference,
        integrated: request.integrated,
    };

    let resolution = state.orchestrator.create_payment(command, &client_ip).await?;
    let body = match resolution {
        PaymentResolution::Hosted(outcome) => PaymentCreatedResponse::Payment {
            reference: outcome.reference,
            payment_id: outcome.payment_id,
            payment_url: outcome.payment_url,
            payment_token: outcome.payment_token,
            amount: outcome.amount,
            amount_formatted: outcome.amount_formatted,
        },
        PaymentResolution::EmailConfirmation { reference, .. } => {
            PaymentCreatedResponse::EmailConfirmation { reference }
        }
    };
    Ok(created_response(body))
}

fn resolve_source(
    cart_items: Option<Vec<OrderItem>>,
    order: Option<OrderData>,
) -> Result<OrderSource, ServiceError> {
    if let Some(items) = cart_items {
        if !items.is_empty() {
            return Ok(OrderSource::Cart(CartSnapshot::from_items(items)));
        }
    }
    order.map(OrderSource::Legacy).ok_or_else(|| {
        ServiceError::ValidationError("an order or a non-empty cart is required".to_string())
    })
}

/// Landing endpoint for the gateway's redirect after payment.
#[utoipa::path(
    get,
    path = "/api/v1/payments/return",
    params(
        ("reference" = String, Query, description = "Order reference"),
        ("status" = String, Query, description = "Gateway outcome: success, cancelled or error"),
        ("code" = Option<String>, Query, description = "Gateway error code")
    ),
    responses((status = 200, description = "Reconciled return view", body = crate::services::reconciliation::ReturnView)),
    tag = "payments"
)]
pub async fn payment_return(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ServiceError> {
    let reference = params
        .get("reference")
        .or_else(|| params.get("order_id"))
        .cloned()
        .ok_or_else(|| ServiceError::InvalidInput("missing order reference".to_string()))?;

    let outcome = RedirectOutcome::from_params(&params);
    let view = state.reconciler.reconcile(&reference, outcome).await?;
    Ok(success_response(view))
}
