//! Outbound client for the hosted-payment gateway.
//!
//! The gateway accepts one payment-creation call and answers with either a
//! hosted redirect URL or, in the embedded (`integrated`) flow, a payment
//! token the front end feeds to the gateway's secure components. Installment
//! financing rides the same call with an authorized amount and a per-line
//! financing cart required by the partner.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, instrument};

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

/// Resolved once at startup; checkout consults this flag instead of probing
/// the gateway at every submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCapability {
    Available,
    Unavailable,
}

/// Billing or shipping identity block. Empty optional fields are stripped
/// from the wire payload.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityBlock {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// One line of the financing partner's cart, required for installment mode
/// independently of the generic order metadata.
#[derive(Debug, Clone, Serialize)]
pub struct FinancingCartLine {
    pub product_name: String,
    /// Minor units
    pub unit_amount: i64,
    pub quantity: u32,
    /// YYYY-MM-DD
    pub expected_delivery_date: String,
    /// "carrier" or "storepickup"; feeds the partner's risk model
    pub delivery_type: String,
    pub delivery_label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostedPaymentUrls {
    pub return_url: String,
    pub cancel_url: String,
}

/// Payment-creation payload. Exactly one of `amount` (full/deposit) or
/// `authorized_amount` (installment financing) is set.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_amount: Option<i64>,
    pub currency: String,
    /// Installment-count-coded method id, e.g. "installment_x3"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_capture: Option<bool>,
    /// Embedded-form flow: the gateway returns a token instead of a redirect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrated: Option<bool>,
    pub billing: IdentityBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<IdentityBlock>,
    pub hosted_payment: HostedPaymentUrls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,
    /// Echoes enough of the order to reconstruct it from a webhook
    pub metadata: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cart: Vec<FinancingCartLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostedPaymentResponse {
    #[serde(default)]
    pub payment_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    #[serde(default)]
    pub hosted_payment: Option<HostedPaymentResponse>,
    /// Present in the embedded flow
    #[serde(default)]
    pub payment_token: Option<String>,
}

impl GatewayPayment {
    pub fn payment_url(&self) -> Option<String> {
        self.hosted_payment
            .as_ref()
            .and_then(|h| h.payment_url.clone())
    }
}

#[derive(Clone)]
pub struct PaymentGatewayClient {
    http: Client,
    base_url: String,
    secret_key: String,
}

impl PaymentGatewayClient {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            secret_key: cfg.secret_key.clone(),
        })
    }

    pub fn capability(&self) -> GatewayCapability {
        if self.secret_key.is_empty() {
            GatewayCapability::Unavailable
        } else {
            GatewayCapability::Available
        }
    }

    /// Create a hosted payment session. Non-2xx answers are logged with their
    /// full body and surfaced as a sanitized failure; raw gateway errors
    /// carry internal identifiers and never reach the caller.
    #[instrument(skip(self, payload), fields(currency = %payload.currency))]
    pub async fn create_payment(
        &self,
        payload: &PaymentPayload,
    ) -> Result<GatewayPayment, ServiceError> {
        let response = self
            .http
            .post(format!("{}/v1/payments", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "payment gateway unreachable");
                ServiceError::ExternalApiError("payment gateway unreachable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body, "payment gateway rejected the request");
            return Err(ServiceError::ExternalApiError(
                "payment gateway refused the payment request".to_string(),
            ));
        }

        response.json::<GatewayPayment>().await.map_err(|e| {
            error!(error = %e, "unreadable gateway response");
            ServiceError::ExternalApiError("unreadable payment gateway response".to_string())
        })
    }
}
