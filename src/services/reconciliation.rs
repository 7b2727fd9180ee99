//! Payment-return reconciliation.
//!
//! The gateway redirects the customer back with an outcome in the query
//! string. Success consumes the pending order written at payment creation;
//! cancellation leaves it in place so an immediate retry reuses it; errors
//! map gateway codes to customer-readable messages. A missing pending order
//! on success still confirms, generically: the money moved, the snapshot is
//! only for display.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::models::order::{PaymentType, PendingOrder};
use crate::pricing;

const PENDING_TTL_HOURS: i64 = 24;

/// Storage for orders awaiting their payment redirect.
#[async_trait]
pub trait PendingOrderStore: Send + Sync {
    async fn put(&self, order: PendingOrder) -> Result<(), ServiceError>;
    async fn get(&self, reference: &str) -> Result<Option<PendingOrder>, ServiceError>;
    async fn delete(&self, reference: &str) -> Result<(), ServiceError>;
}

#[async_trait]
impl<S: PendingOrderStore + ?Sized> PendingOrderStore for std::sync::Arc<S> {
    async fn put(&self, order: PendingOrder) -> Result<(), ServiceError> {
        (**self).put(order).await
    }

    async fn get(&self, reference: &str) -> Result<Option<PendingOrder>, ServiceError> {
        (**self).get(reference).await
    }

    async fn delete(&self, reference: &str) -> Result<(), ServiceError> {
        (**self).delete(reference).await
    }
}

/// In-process store. Entries older than a day are pruned on write; a redirect
/// that takes longer than that is not coming back.
#[derive(Default)]
pub struct InMemoryPendingOrderStore {
    orders: DashMap<String, PendingOrder>,
}

impl InMemoryPendingOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingOrderStore for InMemoryPendingOrderStore {
    async fn put(&self, order: PendingOrder) -> Result<(), ServiceError> {
        let cutoff = Utc::now() - ChronoDuration::hours(PENDING_TTL_HOURS);
        self.orders.retain(|_, o| o.created_at > cutoff);
        self.orders.insert(order.reference.clone(), order);
        Ok(())
    }

    async fn get(&self, reference: &str) -> Result<Option<PendingOrder>, ServiceError> {
        Ok(self.orders.get(reference).map(|e| e.value().clone()))
    }

    async fn delete(&self, reference: &str) -> Result<(), ServiceError> {
        self.orders.remove(reference);
        Ok(())
    }
}

/// Outcome encoded in the gateway's redirect query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    Success,
    Cancelled,
    Error(String),
}

impl RedirectOutcome {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        match params.get("status").map(String::as_str) {
            Some("success") => Self::Success,
            Some("cancelled") | Some("canceled") => Self::Cancelled,
            Some("error") | None => {
                let code = params
                    .get("code")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string());
                Self::Error(code)
            }
            Some(other) => Self::Error(other.to_string()),
        }
    }
}

/// What the return page shows.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ReturnView {
    Confirmation {
        reference: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        amount_paid: Option<String>,
        next_steps: String,
    },
    /// Customer abandoned the payment; the order is still there to retry.
    RetryPrompt { reference: String, message: String },
    Failure { message: String },
}

pub struct ReturnReconciler<S: PendingOrderStore> {
    store: S,
    currency: String,
}

impl<S: PendingOrderStore> ReturnReconciler<S> {
    pub fn new(store: S, currency: impl Into<String>) -> Self {
        Self {
            store,
            currency: currency.into(),
        }
    }

    pub async fn reconcile(
        &self,
        reference: &str,
        outcome: RedirectOutcome,
    ) -> Result<ReturnView, ServiceError> {
        match outcome {
            RedirectOutcome::Success => self.confirm(reference).await,
            RedirectOutcome::Cancelled => {
                info!(reference, "payment cancelled by the customer");
                Ok(ReturnView::RetryPrompt {
                    reference: reference.to_string(),
                    message: "Le paiement a été annulé. Votre commande vous attend toujours."
                        .to_string(),
                })
            }
            RedirectOutcome::Error(code) => {
                warn!(reference, code, "payment returned with an error code");
                Ok(ReturnView::Failure {
                    message: error_message(&code).to_string(),
                })
            }
        }
    }

    async fn confirm(&self, reference: &str) -> Result<ReturnView, ServiceError> {
        let pending = self.store.get(reference).await?;
        match pending {
            Some(order) => {
                self.store.delete(reference).await?;
                info!(reference, payment_type = %order.payment_type, "payment confirmed");
                Ok(ReturnView::Confirmation {
                    reference: reference.to_string(),
                    message: "Votre paiement a bien été reçu.".to_string(),
                    amount_paid: Some(pricing::format_amount(order.paid_amount, &self.currency)),
                    next_steps: next_steps(&order).to_string(),
                })
            }
            None => {
                // Restart, expiry or a direct visit: the payment succeeded at
                // the gateway, confirm without the order detail.
                warn!(reference, "no pending order for a successful return");
                Ok(ReturnView::Confirmation {
                    reference: reference.to_string(),
                    message: "Votre paiement a bien été reçu.".to_string(),
                    amount_paid: None,
                    next_steps:
                        "Vous recevrez un email de confirmation avec le détail de votre commande."
                            .to_string(),
                })
            }
        }
    }
}

fn next_steps(order: &PendingOrder) -> &'static str {
    match order.payment_type {
        PaymentType::Deposit => {
            "Votre acompte est enregistré. Le solde vous sera demandé avant l'expédition."
        }
        PaymentType::Installment3x | PaymentType::Installment4x => {
            "Votre financement est accepté. Les échéances seront prélevées automatiquement."
        }
        _ => "Votre commande est confirmée. Nous préparons son expédition.",
    }
}

/// Gateway error codes the return page knows how to phrase.
fn error_message(code: &str) -> &'static str {
    match code {
        "refused" | "declined" => "Le paiement a été refusé par votre banque.",
        "expired" => "La session de paiement a expiré. Merci de réessayer.",
        "insufficient_funds" => "Le paiement a été refusé pour provision insuffisante.",
        "fraud_suspected" => "Le paiement n'a pas pu être accepté. Contactez votre banque.",
        _ => "Le paiement n'a pas abouti. Merci de réessayer ou de nous contacter.",
    }
}
