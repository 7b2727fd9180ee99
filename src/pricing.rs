//! Pure pricing primitives.
//!
//! Every amount the service displays, validates or sends to the gateway is
//! derived here, from one module, so the quote path and the anti-tampering
//! validator can never disagree on a rounding rule.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::order::ShippingMethod;

/// Carrier shipping costs the flat configured fee; pickup at the workshop is
/// free. `None` (method not chosen yet) prices as free so partial quotes
/// still render.
pub fn shipping_cost(method: Option<ShippingMethod>, carrier_fee: Decimal) -> Decimal {
    match method {
        Some(ShippingMethod::Colissimo) => carrier_fee,
        Some(ShippingMethod::Pickup) | None => Decimal::ZERO,
    }
}

pub fn total_with_shipping(items_total: Decimal, shipping: Decimal) -> Decimal {
    items_total + shipping
}

/// Deposit due at order time: `rate × total`, rounded half-up to the whole
/// currency unit.
pub fn deposit_amount(total: Decimal, rate: Decimal) -> Decimal {
    (total * rate).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Split a total into `n` near-equal installments.
///
/// The base share is `floor(total / n)` in whole currency units and the
/// entire remainder lands on the first installment, so the sum is exact and
/// only the first installment can differ. Downstream schedule display relies
/// on exactly this shape.
pub fn installment_split(total: Decimal, n: u32) -> Vec<Decimal> {
    if n <= 1 {
        return vec![total];
    }
    let n_dec = Decimal::from(n);
    let base = (total / n_dec).floor();
    let first = total - base * (n_dec - Decimal::ONE);

    let mut parts = Vec::with_capacity(n as usize);
    parts.push(first);
    for _ in 1..n {
        parts.push(base);
    }
    parts
}

/// Installment financing is only offered inside the partner's accepted
/// order-value range (inclusive bounds).
pub fn is_installment_eligible(total: Decimal, min: Decimal, max: Decimal) -> bool {
    total >= min && total <= max
}

/// Convert a display amount to gateway minor units (cents). Rounded half-up;
/// fractional subunits are never sent. Amounts are bounded by the configured
/// transaction maximum well before this conversion.
pub fn to_minor_units(amount: Decimal, factor: u32) -> i64 {
    (amount * Decimal::from(factor))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(i64::MAX)
}

/// Round down to the nearest 5 currency units. Used for both discounted
/// catalog prices and custom-build price floors, on both sides of the wire.
pub fn floor_to_five(amount: Decimal) -> Decimal {
    let five = Decimal::from(5);
    (amount / five).floor() * five
}

/// Apply a percentage discount to a catalog price, rounding down to the
/// nearest 5 so client and server cannot disagree on the discounted price.
pub fn apply_discount(price: Decimal, percent: Decimal) -> Decimal {
    floor_to_five(price * (Decimal::ONE_HUNDRED - percent) / Decimal::ONE_HUNDRED)
}

/// Human-readable amount, French convention: "1 510,00 €".
pub fn format_amount(amount: Decimal, currency: &str) -> String {
    let rounded = amount.round_dp(2);
    let raw = format!("{:.2}", rounded);
    let (sign, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest.to_string()),
        None => ("", raw),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned.as_str(), "00"));

    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    let symbol = if currency.eq_ignore_ascii_case("EUR") {
        "€".to_string()
    } else {
        currency.to_string()
    };
    format!("{}{},{} {}", sign, grouped, frac_part, symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test]
    fn shipping_cost_by_method() {
        assert_eq!(
            shipping_cost(Some(ShippingMethod::Colissimo), dec!(50)),
            dec!(50)
        );
        assert_eq!(shipping_cost(Some(ShippingMethod::Pickup), dec!(50)), dec!(0));
        assert_eq!(shipping_cost(None, dec!(50)), dec!(0));
    }

    #[test]
    fn deposit_rounds_half_up() {
        assert_eq!(deposit_amount(dec!(1450), dec!(0.30)), dec!(435));
        assert_eq!(deposit_amount(dec!(1365), dec!(0.30)), dec!(410)); // 409.5 rounds up
        assert_eq!(deposit_amount(dec!(1005), dec!(0.30)), dec!(302)); // 301.5 rounds up
    }

    #[test]
    fn split_remainder_goes_to_first_slot() {
        assert_eq!(installment_split(dec!(1000), 3), vec![dec!(334), dec!(333), dec!(333)]);
        assert_eq!(installment_split(dec!(1000), 4), vec![dec!(250), dec!(250), dec!(250), dec!(250)]);
        assert_eq!(installment_split(dec!(1001), 4), vec![dec!(251), dec!(250), dec!(250), dec!(250)]);
    }

    #[test_case(dec!(1500), true; "mid range")]
    #[test_case(dec!(100), true; "lower bound inclusive")]
    #[test_case(dec!(3000), true; "upper bound inclusive")]
    #[test_case(dec!(50), false; "below range")]
    #[test_case(dec!(5000), false; "above range")]
    fn installment_eligibility(total: Decimal, expected: bool) {
        assert_eq!(
            is_installment_eligible(total, dec!(100), dec!(3000)),
            expected
        );
    }

    #[test]
    fn minor_units_never_fractional() {
        assert_eq!(to_minor_units(dec!(1510), 100), 151_000);
        assert_eq!(to_minor_units(dec!(12.345), 100), 1235);
        assert_eq!(to_minor_units(dec!(0.005), 100), 1);
    }

    #[test]
    fn floor_to_five_and_discount() {
        assert_eq!(floor_to_five(dec!(1035)), dec!(1035));
        assert_eq!(floor_to_five(dec!(1038)), dec!(1035));
        // 1200 with 10% off: 1080 is already a multiple of 5
        assert_eq!(apply_discount(dec!(1200), dec!(10)), dec!(1080));
        // 1199 with 10% off: 1079.1 floors to 1075
        assert_eq!(apply_discount(dec!(1199), dec!(10)), dec!(1075));
    }

    #[test]
    fn formatted_amounts_use_french_convention() {
        assert_eq!(format_amount(dec!(1510), "EUR"), "1 510,00 €");
        assert_eq!(format_amount(dec!(435), "EUR"), "435,00 €");
        assert_eq!(format_amount(dec!(1234567.5), "EUR"), "1 234 567,50 €");
        assert_eq!(format_amount(dec!(12), "CHF"), "12,00 CHF");
    }

    proptest! {
        #[test]
        fn split_sum_is_exact_and_first_dominates(total in 0i64..=500_000, n in 3u32..=4) {
            let total = Decimal::from(total);
            let parts = installment_split(total, n);
            prop_assert_eq!(parts.len(), n as usize);
            let sum: Decimal = parts.iter().copied().sum();
            prop_assert_eq!(sum, total);
            for p in &parts[1..] {
                prop_assert!(parts[0] >= *p);
                prop_assert!(*p >= Decimal::ZERO);
            }
        }

        #[test]
        fn floor_to_five_is_a_multiple_and_close(cents in 0i64..=2_000_000) {
            let amount = Decimal::new(cents, 2);
            let floored = floor_to_five(amount);
            prop_assert!(floored <= amount);
            prop_assert!(amount - floored < Decimal::from(5));
            prop_assert_eq!(floored % Decimal::from(5), Decimal::ZERO);
        }
    }
}
