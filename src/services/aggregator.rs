//! Order data aggregation: one resolution point for "what is being bought".
//!
//! Two entry paths feed checkout. The cart snapshot, when non-empty, always
//! wins; the legacy path flattens a single order into URL-style parameters
//! and degrades gracefully when individual parameters are missing or out of
//! range. Downstream code only ever sees the resolved [`OrderSource`].

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::PricingConfig;
use crate::models::order::{
    CartSnapshot, ItemDetails, OrderData, OrderOption, OrderOrigin, OrderSource, ShippingMethod,
};
use crate::pricing;

const DEFAULT_LEGACY_PRICE: Decimal = Decimal::from_parts(1450, 0, 0, false, 0);

/// Result of resolving the entry paths.
#[derive(Debug)]
pub enum AggregateOutcome {
    Order(OrderSource),
    /// An explicit cart flag with an empty cart means the customer navigated
    /// here with nothing to buy; send them back to the catalog rather than
    /// rendering an empty checkout.
    RedirectToCatalog,
}

/// Recomputed price breakdown for an order, before any payment-mode choice.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriceQuote {
    pub items_total: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    pub deposit: Decimal,
    pub installment_eligible: bool,
    pub installments_3x: Vec<Decimal>,
    pub installments_4x: Vec<Decimal>,
    pub currency: String,
    pub total_formatted: String,
    pub deposit_formatted: String,
}

/// Resolve the order being checked out from the two entry paths.
pub fn aggregate(
    cart: Option<&CartSnapshot>,
    params: &HashMap<String, String>,
) -> AggregateOutcome {
    if let Some(cart) = cart {
        if !cart.is_empty() {
            debug!(items = cart.items.len(), "resolved order from cart");
            return AggregateOutcome::Order(OrderSource::Cart(cart.clone()));
        }
    }

    let cart_flagged = params.get("cart").map(|v| v == "1").unwrap_or(false);
    if cart_flagged {
        warn!("cart entry flagged but cart is empty, redirecting to catalog");
        return AggregateOutcome::RedirectToCatalog;
    }

    AggregateOutcome::Order(OrderSource::Legacy(parse_legacy_params(params)))
}

/// Flatten legacy URL parameters into a single-item order. Missing or
/// malformed values fall back to defaults; a checkout page that renders with
/// a default is recoverable, a hard failure is not. The price validator is
/// the integrity gate, not this parser.
fn parse_legacy_params(params: &HashMap<String, String>) -> OrderData {
    let instrument_id = params
        .get("id")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let origin = match params.get("source").map(String::as_str) {
        Some("stock") if instrument_id.is_some() => OrderOrigin::Stock,
        Some("stock") => {
            warn!("stock source without an instrument id, treating as custom");
            OrderOrigin::Custom
        }
        _ => OrderOrigin::Custom,
    };

    let price = params
        .get("price")
        .and_then(|raw| Decimal::from_str(raw.trim()).ok())
        .filter(Decimal::is_integer)
        .filter(|p| *p >= Decimal::ONE && *p <= Decimal::from(20_000))
        .unwrap_or_else(|| {
            warn!("legacy price parameter missing or out of range, using default");
            DEFAULT_LEGACY_PRICE
        });

    let name = params
        .get("name")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Handpan".to_string());

    let shipping_method = params
        .get("shipping")
        .and_then(|raw| ShippingMethod::from_str(raw.trim()).ok());

    let details = ItemDetails {
        range: params.get("gamme").cloned().filter(|s| !s.is_empty()),
        size: params.get("taille").cloned().filter(|s| !s.is_empty()),
        tonality: params.get("tonalite").cloned().filter(|s| !s.is_empty()),
        material: params.get("matiere").cloned().filter(|s| !s.is_empty()),
        note_count: params.get("notes").and_then(|raw| raw.trim().parse().ok()),
    };

    let case_option = match (params.get("housse_id"), params.get("housse_prix")) {
        (Some(id), Some(raw_price)) if !id.trim().is_empty() => Decimal::from_str(raw_price.trim())
            .ok()
            .map(|price| OrderOption {
                kind: "case".to_string(),
                id: id.trim().to_string(),
                name: params
                    .get("housse_nom")
                    .cloned()
                    .unwrap_or_else(|| "Housse".to_string()),
                price,
            }),
        _ => None,
    };

    OrderData {
        origin,
        instrument_id,
        name,
        price,
        details,
        shipping_method,
        case_option,
    }
}

/// Recompute the full price breakdown for an order. Never trusts declared
/// totals: item totals come from the normalized items, shipping from the
/// method, everything else derives from those two.
pub fn quote(
    source: &OrderSource,
    shipping: Option<ShippingMethod>,
    cfg: &PricingConfig,
) -> PriceQuote {
    let items_total = source.items_total();
    let method = shipping.or_else(|| source.embedded_shipping());
    let shipping_cost = pricing::shipping_cost(method, cfg.shipping_fee);
    let total = pricing::total_with_shipping(items_total, shipping_cost);
    let deposit = pricing::deposit_amount(total, cfg.deposit_rate);
    let installment_eligible =
        pricing::is_installment_eligible(total, cfg.installment_min, cfg.installment_max);

    PriceQuote {
        items_total,
        shipping_cost,
        total,
        deposit,
        installment_eligible,
        installments_3x: pricing::installment_split(total, 3),
        installments_4x: pricing::installment_split(total, 4),
        currency: cfg.currency.clone(),
        total_formatted: pricing::format_amount(total, &cfg.currency),
        deposit_formatted: pricing::format_amount(deposit, &cfg.currency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{ItemKind, OrderItem};
    use rust_decimal_macros::dec;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn one_item_cart(price: Decimal) -> CartSnapshot {
        CartSnapshot::from_items(vec![OrderItem {
            id: "it-1".to_string(),
            kind: ItemKind::Instrument,
            source_id: Some("HP-1".to_string()),
            name: "Atlas D minor".to_string(),
            unit_price: price,
            quantity: 1,
            line_total: price,
            details: ItemDetails::default(),
            options: Vec::new(),
        }])
    }

    #[test]
    fn non_empty_cart_wins_over_params() {
        let cart = one_item_cart(dec!(1400));
        let legacy = params(&[("source", "stock"), ("id", "HP-9"), ("price", "900")]);

        match aggregate(Some(&cart), &legacy) {
            AggregateOutcome::Order(OrderSource::Cart(snapshot)) => {
                assert_eq!(snapshot.total_price, dec!(1400));
            }
            other => panic!("expected cart order, got {:?}", other),
        }
    }

    #[test]
    fn flagged_empty_cart_redirects() {
        let empty = CartSnapshot::from_items(Vec::new());
        let flagged = params(&[("cart", "1")]);
        assert!(matches!(
            aggregate(Some(&empty), &flagged),
            AggregateOutcome::RedirectToCatalog
        ));

        // Without the flag the legacy parser takes over.
        assert!(matches!(
            aggregate(Some(&empty), &params(&[("price", "1365")])),
            AggregateOutcome::Order(OrderSource::Legacy(_))
        ));
    }

    #[test]
    fn legacy_price_out_of_range_or_fractional_falls_back() {
        for raw in ["0", "25000", "-3", "abc", "", "1365.5", "0.5"] {
            let data = parse_legacy_params(&params(&[("price", raw)]));
            assert_eq!(data.price, dec!(1450), "price {:?} should default", raw);
        }
        let ok = parse_legacy_params(&params(&[("price", "1365")]));
        assert_eq!(ok.price, dec!(1365));
    }

    #[test]
    fn stock_source_requires_an_id() {
        let without_id = parse_legacy_params(&params(&[("source", "stock")]));
        assert_eq!(without_id.origin, OrderOrigin::Custom);

        let with_id = parse_legacy_params(&params(&[("source", "stock"), ("id", "HP-1")]));
        assert_eq!(with_id.origin, OrderOrigin::Stock);
        assert_eq!(with_id.instrument_id.as_deref(), Some("HP-1"));
    }

    #[test]
    fn legacy_case_option_and_shipping_parse() {
        let data = parse_legacy_params(&params(&[
            ("price", "1365"),
            ("shipping", "retrait"),
            ("housse_id", "case-std"),
            ("housse_nom", "Housse standard"),
            ("housse_prix", "60"),
            ("notes", "11"),
        ]));
        assert_eq!(data.shipping_method, Some(ShippingMethod::Pickup));
        assert_eq!(data.details.note_count, Some(11));
        let case = data.case_option.expect("case option");
        assert_eq!(case.price, dec!(60));
        assert_eq!(case.id, "case-std");
    }

    #[test]
    fn quote_recomputes_everything() {
        let cart = one_item_cart(dec!(1460));
        let source = OrderSource::Cart(cart);
        let cfg = PricingConfig::default();

        let q = quote(&source, Some(ShippingMethod::Colissimo), &cfg);
        assert_eq!(q.items_total, dec!(1460));
        assert_eq!(q.shipping_cost, dec!(50));
        assert_eq!(q.total, dec!(1510));
        assert_eq!(q.deposit, dec!(453));
        assert!(q.installment_eligible);
        assert_eq!(q.installments_3x, vec![dec!(504), dec!(503), dec!(503)]);
        assert_eq!(q.total_formatted, "1 510,00 €");

        let pickup = quote(&source, Some(ShippingMethod::Pickup), &cfg);
        assert_eq!(pickup.total, dec!(1460));
    }
}
