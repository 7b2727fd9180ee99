//! Payment creation, end to end.
//!
//! One entry point runs the whole gate sequence in a fixed order: rate limit,
//! price integrity, amount integrity, customer data, then the gateway call
//! and the pending-order snapshot. The ordering is deliberate: the cheapest
//! checks run first and nothing reaches the gateway until every local gate
//! has passed.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{GatewayConfig, PricingConfig, RateLimitConfig};
use crate::errors::ServiceError;
use crate::gateway::{
    FinancingCartLine, HostedPaymentUrls, IdentityBlock, PaymentGatewayClient, PaymentPayload,
};
use crate::models::order::{
    CustomerInfo, ItemKind, OrderSource, PaymentType, PendingOrder, ShippingMethod,
};
use crate::pricing;
use crate::rate_limiter::{RateLimitError, RateLimiter};
use crate::services::checkout::{CheckoutAction, CheckoutSession, EmailOrderSummary};
use crate::services::reconciliation::PendingOrderStore;
use crate::services::validation::PriceValidator;

const PAYMENT_ENDPOINT: &str = "create_payment";
const STOCK_DELIVERY_LEAD_DAYS: i64 = 7;
const CUSTOM_DELIVERY_LEAD_DAYS: i64 = 45;

/// Everything a payment submission carries.
#[derive(Debug)]
pub struct CreatePaymentCommand {
    pub source: OrderSource,
    pub shipping: Option<ShippingMethod>,
    pub payment_type: PaymentType,
    pub customer: CustomerInfo,
    /// Amount the customer saw and agreed to pay now
    pub declared_amount: Decimal,
    /// Client-supplied order reference for retries; generated when absent
    pub reference: Option<String>,
    /// Embedded-form flow instead of the hosted redirect
    pub integrated: bool,
}

/// Successful hosted-payment creation.
#[derive(Debug)]
pub struct CreatePaymentOutcome {
    pub reference: String,
    pub payment_id: String,
    pub payment_url: Option<String>,
    pub payment_token: Option<String>,
    pub amount: Decimal,
    pub amount_formatted: String,
}

/// How a submission resolved: a gateway payment or the manual email path.
#[derive(Debug)]
pub enum PaymentResolution {
    Hosted(CreatePaymentOutcome),
    EmailConfirmation {
        reference: String,
        summary: EmailOrderSummary,
    },
}

pub struct PaymentOrchestrator {
    validator: PriceValidator,
    gateway: Arc<PaymentGatewayClient>,
    rate_limiter: RateLimiter,
    pending: Arc<dyn PendingOrderStore>,
    pricing: PricingConfig,
    rate_limits: RateLimitConfig,
    gateway_cfg: GatewayConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        validator: PriceValidator,
        gateway: Arc<PaymentGatewayClient>,
        rate_limiter: RateLimiter,
        pending: Arc<dyn PendingOrderStore>,
        pricing: PricingConfig,
        rate_limits: RateLimitConfig,
        gateway_cfg: GatewayConfig,
    ) -> Self {
        Self {
            validator,
            gateway,
            rate_limiter,
            pending,
            pricing,
            rate_limits,
            gateway_cfg,
        }
    }

    /// Run the full gate sequence and create the payment.
    #[instrument(skip(self, command), fields(payment_type = %command.payment_type, client_ip))]
    pub async fn create_payment(
        &self,
        command: CreatePaymentCommand,
        client_ip: &str,
    ) -> Result<PaymentResolution, ServiceError> {
        self.enforce_rate_limit(client_ip).await?;

        self.validator.validate_order(&command.source).await?;

        let session = CheckoutSession::open(
            command.source,
            command.shipping,
            command.payment_type,
            command.customer,
            &self.pricing,
        )?;
        let expected_due = session.amount_due();

        if command.payment_type != PaymentType::Appointment {
            self.check_amount(command.declared_amount, expected_due)?;
        }

        let reference = command
            .reference
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(generate_reference);

        match session.resolve(self.gateway.capability()) {
            CheckoutAction::EmailFallback(summary) => {
                info!(reference, "order routed to the email confirmation path");
                Ok(PaymentResolution::EmailConfirmation { reference, summary })
            }
            CheckoutAction::Pay(order) => {
                validate_customer(&order.customer, order.payment_type)?;

                let payload = self.build_payload(&order, &reference, command.integrated);
                let payment = self.gateway.create_payment(&payload).await?;

                self.pending
                    .put(PendingOrder {
                        reference: reference.clone(),
                        customer: order.customer.clone(),
                        cart_items: order.source.normalized_items(),
                        payment_type: order.payment_type,
                        paid_amount: order.amount_due,
                        shipping_method: order.shipping_method,
                        shipping_cost: order.shipping_cost,
                        created_at: Utc::now(),
                    })
                    .await?;

                info!(reference, payment_id = %payment.id, "payment created");
                Ok(PaymentResolution::Hosted(CreatePaymentOutcome {
                    reference,
                    payment_url: payment.payment_url(),
                    payment_token: payment.payment_token.clone(),
                    payment_id: payment.id,
                    amount: order.amount_due,
                    amount_formatted: pricing::format_amount(order.amount_due, &order.currency),
                }))
            }
        }
    }

    /// Payment creation fails closed: an unreachable rate-limit backend denies
    /// the request rather than letting an attacker time their burst to an
    /// outage.
    async fn enforce_rate_limit(&self, client_ip: &str) -> Result<(), ServiceError> {
        let decision = self
            .rate_limiter
            .check_and_increment(
                client_ip,
                PAYMENT_ENDPOINT,
                self.rate_limits.payment_max_requests,
                Duration::from_secs(self.rate_limits.payment_window_secs),
                true,
            )
            .await;

        match decision {
            Ok(d) if d.allowed => Ok(()),
            Ok(d) => {
                warn!(client_ip, current = d.current, "payment rate limit hit");
                Err(ServiceError::RateLimitExceeded)
            }
            Err(RateLimitError::BackendUnavailable(_)) => Err(ServiceError::RateLimitExceeded),
        }
    }

    /// The declared amount must cover the recomputed amount due, within
    /// tolerance, and sit inside the global transaction bounds. Overpaying is
    /// accepted; a customer rounding up is not an attack.
    fn check_amount(&self, declared: Decimal, expected_due: Decimal) -> Result<(), ServiceError> {
        if declared < expected_due - self.pricing.price_tolerance {
            warn!(%declared, %expected_due, "declared amount below the recomputed amount due");
            return Err(ServiceError::PriceIntegrity(
                "the amount to pay does not match the order".to_string(),
            ));
        }
        if declared < self.pricing.min_amount || declared > self.pricing.max_amount {
            return Err(ServiceError::ValidationError(format!(
                "amount must be between {} and {} {}",
                self.pricing.min_amount, self.pricing.max_amount, self.pricing.currency
            )));
        }
        Ok(())
    }

    fn build_payload(
        &self,
        order: &crate::services::checkout::PaymentOrder,
        reference: &str,
        integrated: bool,
    ) -> PaymentPayload {
        let minor = pricing::to_minor_units(order.amount_due, self.pricing.minor_unit_factor);
        let installments = order.payment_type.installment_count();

        let billing = identity_block(&order.customer);
        let shipping_block = match order.shipping_method {
            Some(ShippingMethod::Colissimo) => Some(billing.clone()),
            _ => None,
        };

        let cart = if installments.is_some() {
            financing_cart(order, self.pricing.minor_unit_factor)
        } else {
            Vec::new()
        };

        PaymentPayload {
            amount: installments.is_none().then_some(minor),
            authorized_amount: installments.is_some().then_some(minor),
            currency: order.currency.clone(),
            payment_method: installments.map(|n| format!("installment_x{}", n)),
            auto_capture: installments.map(|_| true),
            integrated: integrated.then_some(true),
            billing,
            shipping: shipping_block,
            hosted_payment: HostedPaymentUrls {
                return_url: self.gateway_cfg.return_url.clone(),
                cancel_url: self.gateway_cfg.cancel_url.clone(),
            },
            notification_url: self.gateway_cfg.notification_url.clone(),
            metadata: order_metadata(order, reference, self.pricing.minor_unit_factor),
            cart,
        }
    }
}

/// Webhook-facing order echo. The notification handler only sees this block,
/// so it carries the full item list and every total in minor units.
fn order_metadata(
    order: &crate::services::checkout::PaymentOrder,
    reference: &str,
    minor_factor: u32,
) -> serde_json::Value {
    let items: Vec<serde_json::Value> = order
        .source
        .normalized_items()
        .iter()
        .map(|item| {
            json!({
                "name": item.name,
                "source_id": item.source_id,
                "quantity": item.quantity,
                "unit_amount": pricing::to_minor_units(item.unit_price, minor_factor),
                "options": item
                    .options
                    .iter()
                    .map(|o| {
                        json!({
                            "id": o.id,
                            "unit_amount": pricing::to_minor_units(o.price, minor_factor),
                        })
                    })
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "reference": reference,
        "payment_type": order.payment_type.to_string(),
        "items": items,
        "order_total": pricing::to_minor_units(order.total, minor_factor),
        "amount_due": pricing::to_minor_units(order.amount_due, minor_factor),
        "shipping_method": order.shipping_method.map(|m| m.to_string()),
        "shipping_cost": pricing::to_minor_units(order.shipping_cost, minor_factor),
    })
}

/// Email is always required; installment financing additionally needs a
/// phone number and a complete postal address for the partner's file.
fn validate_customer(customer: &CustomerInfo, payment_type: PaymentType) -> Result<(), ServiceError> {
    if !validator::validate_email(&customer.email) {
        return Err(ServiceError::ValidationError(
            "a valid email address is required".to_string(),
        ));
    }
    if customer.first_name.trim().is_empty() || customer.last_name.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "first and last name are required".to_string(),
        ));
    }

    if payment_type.installment_count().is_some() {
        if customer
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .is_none()
        {
            return Err(ServiceError::ValidationError(
                "a phone number is required for installment payment".to_string(),
            ));
        }
        match &customer.address {
            Some(address) if address.is_complete() => {}
            _ => {
                return Err(ServiceError::ValidationError(
                    "a complete postal address is required for installment payment".to_string(),
                ))
            }
        }
    }
    Ok(())
}

fn identity_block(customer: &CustomerInfo) -> IdentityBlock {
    let address = customer.address.as_ref();
    IdentityBlock {
        email: customer.email.clone(),
        first_name: customer.first_name.clone(),
        last_name: customer.last_name.clone(),
        phone: customer.phone.clone(),
        address1: address.map(|a| a.line1.clone()),
        address2: address.and_then(|a| a.line2.clone()),
        postcode: address.map(|a| a.postcode.clone()),
        city: address.map(|a| a.city.clone()),
        country: address.map(|a| a.country.clone()),
    }
}

/// The financing partner wants a cart with delivery estimates per line, not
/// just a total. Stock items ship within the week; custom builds carry the
/// workshop lead time.
fn financing_cart(
    order: &crate::services::checkout::PaymentOrder,
    minor_factor: u32,
) -> Vec<FinancingCartLine> {
    let (delivery_type, delivery_label) = match order.shipping_method {
        Some(ShippingMethod::Pickup) => ("storepickup", "Retrait à l'atelier"),
        _ => ("carrier", "Colissimo"),
    };

    // Options become their own lines: folding them into a per-unit price
    // truncates, and the partner cross-checks the cart sum against the
    // authorized amount.
    let mut lines: Vec<FinancingCartLine> = Vec::new();
    for item in order.source.normalized_items() {
        let lead_days = match item.kind {
            ItemKind::Custom => CUSTOM_DELIVERY_LEAD_DAYS,
            _ => STOCK_DELIVERY_LEAD_DAYS,
        };
        let delivery = (Utc::now() + ChronoDuration::days(lead_days))
            .format("%Y-%m-%d")
            .to_string();
        lines.push(FinancingCartLine {
            product_name: item.name.clone(),
            unit_amount: pricing::to_minor_units(item.unit_price, minor_factor),
            quantity: item.quantity,
            expected_delivery_date: delivery.clone(),
            delivery_type: delivery_type.to_string(),
            delivery_label: delivery_label.to_string(),
        });
        for option in &item.options {
            lines.push(FinancingCartLine {
                product_name: option.name.clone(),
                unit_amount: pricing::to_minor_units(option.price, minor_factor),
                quantity: 1,
                expected_delivery_date: delivery.clone(),
                delivery_type: delivery_type.to_string(),
                delivery_label: delivery_label.to_string(),
            });
        }
    }

    if order.shipping_cost > Decimal::ZERO {
        let delivery = Utc::now() + ChronoDuration::days(STOCK_DELIVERY_LEAD_DAYS);
        lines.push(FinancingCartLine {
            product_name: "Livraison".to_string(),
            unit_amount: pricing::to_minor_units(order.shipping_cost, minor_factor),
            quantity: 1,
            expected_delivery_date: delivery.format("%Y-%m-%d").to_string(),
            delivery_type: delivery_type.to_string(),
            delivery_label: delivery_label.to_string(),
        });
    }
    lines
}

/// Order references: `CMD-YYYYMMDD-XXXXXXXX`, date plus the first segment of
/// a v4 UUID. Readable over the phone, unguessable enough for a lookup key.
fn generate_reference() -> String {
    let random = Uuid::new_v4()
        .to_string()
        .split('-')
        .next()
        .unwrap_or("00000000")
        .to_uppercase();
    format!("CMD-{}-{}", Utc::now().format("%Y%m%d"), random)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{
        CartSnapshot, ItemDetails, OrderData, OrderItem, OrderOption, OrderOrigin, PostalAddress,
    };
    use rust_decimal_macros::dec;

    fn customer_with_address() -> CustomerInfo {
        CustomerInfo {
            email: "lea@example.fr".to_string(),
            first_name: "Léa".to_string(),
            last_name: "Martin".to_string(),
            phone: Some("+33612345678".to_string()),
            address: Some(PostalAddress {
                line1: "12 rue des Forges".to_string(),
                line2: None,
                postcode: "44000".to_string(),
                city: "Nantes".to_string(),
                country: "FR".to_string(),
            }),
        }
    }

    #[test]
    fn reference_shape() {
        let reference = generate_reference();
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CMD");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert_eq!(parts[2], parts[2].to_uppercase());
    }

    #[test]
    fn customer_gates_by_payment_mode() {
        let full = customer_with_address();
        assert!(validate_customer(&full, PaymentType::Full).is_ok());
        assert!(validate_customer(&full, PaymentType::Installment3x).is_ok());

        let mut no_phone = customer_with_address();
        no_phone.phone = None;
        assert!(validate_customer(&no_phone, PaymentType::Full).is_ok());
        let err = validate_customer(&no_phone, PaymentType::Installment3x).unwrap_err();
        assert!(err.to_string().contains("phone"));

        let mut no_address = customer_with_address();
        no_address.address = None;
        assert!(validate_customer(&no_address, PaymentType::Deposit).is_ok());
        assert!(validate_customer(&no_address, PaymentType::Installment4x).is_err());

        let mut bad_email = customer_with_address();
        bad_email.email = "not-an-email".to_string();
        assert!(validate_customer(&bad_email, PaymentType::Full).is_err());
    }

    #[test]
    fn financing_cart_carries_lead_times_and_shipping_line() {
        let order = crate::services::checkout::PaymentOrder {
            source: OrderSource::Legacy(OrderData {
                origin: OrderOrigin::Custom,
                instrument_id: None,
                name: "Custom 11 notes".to_string(),
                price: dec!(1365),
                details: ItemDetails::default(),
                shipping_method: None,
                case_option: None,
            }),
            customer: customer_with_address(),
            payment_type: PaymentType::Installment3x,
            shipping_method: Some(ShippingMethod::Colissimo),
            amount_due: dec!(1415),
            total: dec!(1415),
            shipping_cost: dec!(50),
            currency: "EUR".to_string(),
        };

        let cart = financing_cart(&order, 100);
        assert_eq!(cart.len(), 2);
        assert_eq!(cart[0].unit_amount, 136_500);
        assert_eq!(cart[0].delivery_type, "carrier");
        assert_eq!(cart[1].product_name, "Livraison");
        assert_eq!(cart[1].unit_amount, 5_000);

        let expected = (Utc::now() + ChronoDuration::days(CUSTOM_DELIVERY_LEAD_DAYS))
            .format("%Y-%m-%d")
            .to_string();
        assert_eq!(cart[0].expected_delivery_date, expected);
    }

    fn multi_quantity_order_with_case() -> crate::services::checkout::PaymentOrder {
        let snapshot = CartSnapshot::from_items(vec![OrderItem {
            id: "it-1".to_string(),
            kind: ItemKind::Accessory,
            source_id: Some("stand".to_string()),
            name: "Support".to_string(),
            unit_price: dec!(100),
            quantity: 3,
            line_total: dec!(300),
            details: ItemDetails::default(),
            options: vec![OrderOption {
                kind: "case".to_string(),
                id: "case-std".to_string(),
                name: "Housse standard".to_string(),
                price: dec!(100),
            }],
        }]);
        crate::services::checkout::PaymentOrder {
            source: OrderSource::Cart(snapshot),
            customer: customer_with_address(),
            payment_type: PaymentType::Installment3x,
            shipping_method: Some(ShippingMethod::Pickup),
            amount_due: dec!(400),
            total: dec!(400),
            shipping_cost: dec!(0),
            currency: "EUR".to_string(),
        }
    }

    #[test]
    fn financing_cart_sum_matches_the_authorized_amount() {
        let order = multi_quantity_order_with_case();
        let cart = financing_cart(&order, 100);

        // The item line and its option line, no shipping (pickup).
        assert_eq!(cart.len(), 2);
        assert_eq!(cart[0].unit_amount, 10_000);
        assert_eq!(cart[0].quantity, 3);
        assert_eq!(cart[1].product_name, "Housse standard");
        assert_eq!(cart[1].unit_amount, 10_000);
        assert_eq!(cart[1].quantity, 1);
        assert_eq!(cart[0].delivery_type, "storepickup");

        let cart_sum: i64 = cart
            .iter()
            .map(|l| l.unit_amount * i64::from(l.quantity))
            .sum();
        assert_eq!(cart_sum, pricing::to_minor_units(order.amount_due, 100));
    }

    #[test]
    fn metadata_echoes_items_and_minor_unit_totals() {
        let order = multi_quantity_order_with_case();
        let metadata = order_metadata(&order, "CMD-20260825-AB12CD34", 100);

        assert_eq!(metadata["reference"], "CMD-20260825-AB12CD34");
        assert_eq!(metadata["order_total"], 40_000);
        assert_eq!(metadata["amount_due"], 40_000);
        assert_eq!(metadata["shipping_cost"], 0);
        assert_eq!(metadata["shipping_method"], "retrait");

        let items = metadata["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "Support");
        assert_eq!(items[0]["source_id"], "stand");
        assert_eq!(items[0]["quantity"], 3);
        assert_eq!(items[0]["unit_amount"], 10_000);
        assert_eq!(items[0]["options"][0]["id"], "case-std");
        assert_eq!(items[0]["options"][0]["unit_amount"], 10_000);
    }
}
