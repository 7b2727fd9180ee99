//! Checkout session: from a resolved order to a payable intent.
//!
//! A session snapshots the order, the shipping choice and the payment mode,
//! recomputes the quote and settles the amount actually due. The output is a
//! gateway-agnostic [`PaymentOrder`]; the orchestrator decides how that
//! intent reaches the gateway, and the session decides when it must not (an
//! appointment order, or no gateway configured) and routes to the manual
//! confirmation path instead.

use rust_decimal::Decimal;
use tracing::info;

use crate::config::PricingConfig;
use crate::errors::ServiceError;
use crate::gateway::GatewayCapability;
use crate::models::order::{CustomerInfo, OrderSource, PaymentType, ShippingMethod};
use crate::pricing;
use crate::services::aggregator::{self, PriceQuote};

/// What checkout resolved to.
#[derive(Debug)]
pub enum CheckoutAction {
    Pay(PaymentOrder),
    /// No card payment happens now; the order is confirmed by email and
    /// settled in person or by transfer.
    EmailFallback(EmailOrderSummary),
}

/// Gateway-agnostic payment intent.
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub source: OrderSource,
    pub customer: CustomerInfo,
    pub payment_type: PaymentType,
    pub shipping_method: Option<ShippingMethod>,
    /// What the customer pays now (deposit) or commits to (full, financed)
    pub amount_due: Decimal,
    /// Full order value including shipping
    pub total: Decimal,
    pub shipping_cost: Decimal,
    pub currency: String,
}

/// Plain-text order summary for the manual confirmation email.
#[derive(Debug, Clone)]
pub struct EmailOrderSummary {
    pub customer_email: String,
    pub subject: String,
    pub body: String,
}

pub struct CheckoutSession {
    source: OrderSource,
    shipping: Option<ShippingMethod>,
    payment_type: PaymentType,
    customer: CustomerInfo,
    quote: PriceQuote,
}

impl CheckoutSession {
    /// Open a session over a resolved order. Fails when the chosen payment
    /// mode is not applicable to this order value.
    pub fn open(
        source: OrderSource,
        shipping: Option<ShippingMethod>,
        payment_type: PaymentType,
        customer: CustomerInfo,
        cfg: &PricingConfig,
    ) -> Result<Self, ServiceError> {
        let quote = aggregator::quote(&source, shipping, cfg);

        if payment_type.installment_count().is_some() && !quote.installment_eligible {
            return Err(ServiceError::ValidationError(format!(
                "installment payment is only available between {} and {} {}",
                cfg.installment_min, cfg.installment_max, cfg.currency
            )));
        }

        Ok(Self {
            source,
            shipping,
            payment_type,
            customer,
            quote,
        })
    }

    pub fn quote(&self) -> &PriceQuote {
        &self.quote
    }

    /// Amount the payment must cover for the selected mode.
    pub fn amount_due(&self) -> Decimal {
        match self.payment_type {
            PaymentType::Deposit => self.quote.deposit,
            PaymentType::Appointment => Decimal::ZERO,
            _ => self.quote.total,
        }
    }

    /// Resolve the session into an action, given what the gateway can do.
    pub fn resolve(self, capability: GatewayCapability) -> CheckoutAction {
        let needs_email = self.payment_type == PaymentType::Appointment
            || capability == GatewayCapability::Unavailable;
        if needs_email {
            info!(
                payment_type = %self.payment_type,
                "routing order to the email confirmation path"
            );
            return CheckoutAction::EmailFallback(self.email_summary());
        }

        let amount_due = self.amount_due();
        CheckoutAction::Pay(PaymentOrder {
            shipping_method: self.shipping.or_else(|| self.source.embedded_shipping()),
            source: self.source,
            customer: self.customer,
            payment_type: self.payment_type,
            amount_due,
            total: self.quote.total,
            shipping_cost: self.quote.shipping_cost,
            currency: self.quote.currency,
        })
    }

    fn email_summary(&self) -> EmailOrderSummary {
        let mut lines = Vec::new();
        for item in self.source.normalized_items() {
            lines.push(format!(
                "- {} x{} : {}",
                item.name,
                item.quantity,
                pricing::format_amount(item.full_total(), &self.quote.currency)
            ));
        }
        lines.push(format!(
            "Livraison : {}",
            pricing::format_amount(self.quote.shipping_cost, &self.quote.currency)
        ));
        lines.push(format!("Total : {}", self.quote.total_formatted));
        if self.payment_type == PaymentType::Deposit {
            lines.push(format!("Acompte : {}", self.quote.deposit_formatted));
        }

        EmailOrderSummary {
            customer_email: self.customer.email.clone(),
            subject: "Votre commande - confirmation à suivre".to_string(),
            body: format!(
                "Bonjour {},\n\nNous avons bien reçu votre commande :\n{}\n\n\
                 Nous revenons vers vous très vite pour finaliser le règlement.\n",
                self.customer.first_name,
                lines.join("\n")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{ItemDetails, OrderData, OrderOrigin};
    use rust_decimal_macros::dec;

    fn customer() -> CustomerInfo {
        CustomerInfo {
            email: "lea@example.fr".to_string(),
            first_name: "Léa".to_string(),
            last_name: "Martin".to_string(),
            phone: None,
            address: None,
        }
    }

    fn legacy_order(price: Decimal) -> OrderSource {
        OrderSource::Legacy(OrderData {
            origin: OrderOrigin::Custom,
            instrument_id: None,
            name: "Custom 11 notes".to_string(),
            price,
            details: ItemDetails::default(),
            shipping_method: None,
            case_option: None,
        })
    }

    #[test]
    fn amount_due_follows_payment_mode() {
        let cfg = PricingConfig::default();
        let full = CheckoutSession::open(
            legacy_order(dec!(1400)),
            Some(ShippingMethod::Colissimo),
            PaymentType::Full,
            customer(),
            &cfg,
        )
        .unwrap();
        assert_eq!(full.amount_due(), dec!(1450));

        let deposit = CheckoutSession::open(
            legacy_order(dec!(1400)),
            Some(ShippingMethod::Colissimo),
            PaymentType::Deposit,
            customer(),
            &cfg,
        )
        .unwrap();
        assert_eq!(deposit.amount_due(), dec!(435));
    }

    #[test]
    fn installment_mode_requires_eligibility() {
        let cfg = PricingConfig::default();
        // 3500 + 50 shipping is above the financing ceiling.
        let err = CheckoutSession::open(
            legacy_order(dec!(3500)),
            Some(ShippingMethod::Colissimo),
            PaymentType::Installment3x,
            customer(),
            &cfg,
        );
        assert!(matches!(err, Err(ServiceError::ValidationError(_))));

        let ok = CheckoutSession::open(
            legacy_order(dec!(1400)),
            Some(ShippingMethod::Pickup),
            PaymentType::Installment3x,
            customer(),
            &cfg,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn appointment_and_missing_gateway_route_to_email() {
        let cfg = PricingConfig::default();
        let appointment = CheckoutSession::open(
            legacy_order(dec!(1400)),
            None,
            PaymentType::Appointment,
            customer(),
            &cfg,
        )
        .unwrap();
        match appointment.resolve(GatewayCapability::Available) {
            CheckoutAction::EmailFallback(summary) => {
                assert_eq!(summary.customer_email, "lea@example.fr");
                assert!(summary.body.contains("Custom 11 notes"));
            }
            other => panic!("expected email fallback, got {:?}", other),
        }

        let full = CheckoutSession::open(
            legacy_order(dec!(1400)),
            None,
            PaymentType::Full,
            customer(),
            &cfg,
        )
        .unwrap();
        assert!(matches!(
            full.resolve(GatewayCapability::Unavailable),
            CheckoutAction::EmailFallback(_)
        ));
    }

    #[test]
    fn resolved_payment_order_carries_the_quote() {
        let cfg = PricingConfig::default();
        let session = CheckoutSession::open(
            legacy_order(dec!(1400)),
            Some(ShippingMethod::Colissimo),
            PaymentType::Full,
            customer(),
            &cfg,
        )
        .unwrap();
        match session.resolve(GatewayCapability::Available) {
            CheckoutAction::Pay(order) => {
                assert_eq!(order.amount_due, dec!(1450));
                assert_eq!(order.total, dec!(1450));
                assert_eq!(order.shipping_cost, dec!(50));
                assert_eq!(order.shipping_method, Some(ShippingMethod::Colissimo));
                assert_eq!(order.currency, "EUR");
            }
            other => panic!("expected payable order, got {:?}", other),
        }
    }
}
