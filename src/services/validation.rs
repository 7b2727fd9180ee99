//! Anti-tampering price validation.
//!
//! Declared prices come from the browser and are untrusted. Every line item
//! and option is recomputed against the catalog or the custom-build formula
//! before any money moves; one bad item fails the whole order. Rejections
//! name the offending item so the customer can fix their cart, but never the
//! server-side expectation.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

use crate::catalog::CatalogProvider;
use crate::config::PricingConfig;
use crate::errors::ServiceError;
use crate::models::order::{ItemKind, OrderItem, OrderSource};
use crate::pricing;

pub struct PriceValidator {
    catalog: Arc<dyn CatalogProvider>,
    pricing: PricingConfig,
}

impl PriceValidator {
    pub fn new(catalog: Arc<dyn CatalogProvider>, pricing: PricingConfig) -> Self {
        Self { catalog, pricing }
    }

    /// Check every item and option of the order against authoritative prices.
    /// The first failing item fails the order.
    pub async fn validate_order(&self, source: &OrderSource) -> Result<(), ServiceError> {
        for item in source.normalized_items() {
            self.validate_item(&item).await?;
            for option in &item.options {
                self.validate_option_price(&item, &option.id, option.price)
                    .await?;
            }
        }
        Ok(())
    }

    async fn validate_item(&self, item: &OrderItem) -> Result<(), ServiceError> {
        match item.kind {
            ItemKind::Instrument => self.validate_stock_instrument(item).await,
            ItemKind::Accessory => {
                let id = item.source_id.as_deref().ok_or_else(|| {
                    ServiceError::PriceIntegrity(format!(
                        "accessory \"{}\" has no catalog reference",
                        item.name
                    ))
                })?;
                self.validate_option_price(item, id, item.unit_price).await
            }
            ItemKind::Custom => self.validate_custom_build(item).await,
        }
    }

    /// Stock instruments validate against the catalog price with any active
    /// discount applied. Reserved and sold instruments cannot be bought, no
    /// matter the price.
    async fn validate_stock_instrument(&self, item: &OrderItem) -> Result<(), ServiceError> {
        let id = item.source_id.as_deref().ok_or_else(|| {
            ServiceError::PriceIntegrity(format!(
                "instrument \"{}\" has no catalog reference",
                item.name
            ))
        })?;

        let instrument = self
            .catalog
            .instrument(id)
            .await?
            .ok_or_else(|| {
                ServiceError::PriceIntegrity(format!("instrument \"{}\" is unknown", item.name))
            })?;

        if !instrument.status.is_sellable() {
            return Err(ServiceError::PriceIntegrity(format!(
                "instrument \"{}\" is no longer available",
                item.name
            )));
        }

        let effective = match instrument.discount_percent {
            Some(percent) => pricing::apply_discount(instrument.price, percent),
            None => instrument.price,
        };
        self.compare(&item.name, item.unit_price, effective)
    }

    /// Custom builds validate against a recomputed floor, not an exact match:
    /// `floor5(note_count × per-note price + size malus)`. A declared price
    /// above the floor is a legitimate upsell; below it is tampering.
    async fn validate_custom_build(&self, item: &OrderItem) -> Result<(), ServiceError> {
        let note_count = match item.details.note_count {
            Some(n) if n >= self.pricing.min_note_count && n <= self.pricing.max_note_count => n,
            Some(n) => {
                warn!(
                    item = %item.name,
                    note_count = n,
                    "note count outside supported range, pricing at minimum"
                );
                self.pricing.min_note_count
            }
            None => self.pricing.min_note_count,
        };

        let malus = match &item.details.size {
            Some(code) => self.catalog.size_malus(code).await?,
            None => Decimal::ZERO,
        };
        let floor = pricing::floor_to_five(
            Decimal::from(note_count) * self.pricing.per_note_price + malus,
        );

        if item.unit_price < floor - self.pricing.price_tolerance {
            warn!(
                item = %item.name,
                declared = %item.unit_price,
                floor = %floor,
                "custom build priced below the floor"
            );
            return Err(ServiceError::PriceIntegrity(format!(
                "price of \"{}\" does not match the configured build",
                item.name
            )));
        }
        Ok(())
    }

    /// Options and accessories must match their catalog price exactly, within
    /// tolerance. No floor semantics: there is nothing configurable about a
    /// case.
    async fn validate_option_price(
        &self,
        item: &OrderItem,
        option_id: &str,
        declared: Decimal,
    ) -> Result<(), ServiceError> {
        let accessory = self.catalog.accessory(option_id).await?.ok_or_else(|| {
            ServiceError::PriceIntegrity(format!(
                "option \"{}\" of \"{}\" is unknown",
                option_id, item.name
            ))
        })?;
        self.compare(&accessory.name, declared, accessory.price)
    }

    fn compare(
        &self,
        name: &str,
        declared: Decimal,
        expected: Decimal,
    ) -> Result<(), ServiceError> {
        if declared < expected - self.pricing.price_tolerance {
            warn!(
                item = name,
                %declared,
                %expected,
                "declared price below the authoritative price"
            );
            return Err(ServiceError::PriceIntegrity(format!(
                "price of \"{}\" does not match the catalog",
                name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogAccessory, CatalogInstrument, InMemoryCatalog, InstrumentStatus};
    use crate::models::order::{ItemDetails, OrderData, OrderOption, OrderOrigin};
    use rust_decimal_macros::dec;

    fn seeded_catalog() -> Arc<InMemoryCatalog> {
        let catalog = InMemoryCatalog::new();
        catalog.insert_instrument(CatalogInstrument {
            id: "HP-1".to_string(),
            name: "Atlas D minor".to_string(),
            price: dec!(1400),
            status: InstrumentStatus::Available,
            discount_percent: None,
        });
        catalog.insert_instrument(CatalogInstrument {
            id: "HP-2".to_string(),
            name: "Solde".to_string(),
            price: dec!(1200),
            status: InstrumentStatus::Available,
            discount_percent: Some(dec!(10)),
        });
        catalog.insert_instrument(CatalogInstrument {
            id: "HP-3".to_string(),
            name: "Vendu".to_string(),
            price: dec!(1400),
            status: InstrumentStatus::Sold,
            discount_percent: None,
        });
        catalog.insert_accessory(CatalogAccessory {
            id: "case-std".to_string(),
            name: "Housse standard".to_string(),
            price: dec!(60),
        });
        catalog.set_size_malus("compact", dec!(100));
        Arc::new(catalog)
    }

    fn validator() -> PriceValidator {
        PriceValidator::new(seeded_catalog(), PricingConfig::default())
    }

    fn stock_order(id: &str, name: &str, price: Decimal) -> OrderSource {
        OrderSource::Legacy(OrderData {
            origin: OrderOrigin::Stock,
            instrument_id: Some(id.to_string()),
            name: name.to_string(),
            price,
            details: ItemDetails::default(),
            shipping_method: None,
            case_option: None,
        })
    }

    fn custom_order(price: Decimal, notes: Option<u8>, size: Option<&str>) -> OrderSource {
        OrderSource::Legacy(OrderData {
            origin: OrderOrigin::Custom,
            instrument_id: None,
            name: "Custom build".to_string(),
            price,
            details: ItemDetails {
                note_count: notes,
                size: size.map(str::to_string),
                ..Default::default()
            },
            shipping_method: None,
            case_option: None,
        })
    }

    #[tokio::test]
    async fn stock_price_must_match_catalog() {
        let v = validator();
        assert!(v.validate_order(&stock_order("HP-1", "Atlas", dec!(1400))).await.is_ok());
        // Within tolerance of one unit.
        assert!(v.validate_order(&stock_order("HP-1", "Atlas", dec!(1399))).await.is_ok());
        // Above catalog is not tampering.
        assert!(v.validate_order(&stock_order("HP-1", "Atlas", dec!(1500))).await.is_ok());

        let err = v
            .validate_order(&stock_order("HP-1", "Atlas", dec!(1000)))
            .await
            .unwrap_err();
        match err {
            ServiceError::PriceIntegrity(msg) => assert!(msg.contains("Atlas")),
            other => panic!("expected price integrity error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn discounted_price_is_the_floored_one() {
        let v = validator();
        // 1200 at 10% off is 1080, already a multiple of 5.
        assert!(v.validate_order(&stock_order("HP-2", "Solde", dec!(1080))).await.is_ok());
        assert!(v.validate_order(&stock_order("HP-2", "Solde", dec!(1000))).await.is_err());
    }

    #[tokio::test]
    async fn unavailable_and_unknown_instruments_are_rejected() {
        let v = validator();
        assert!(v.validate_order(&stock_order("HP-3", "Vendu", dec!(1400))).await.is_err());
        assert!(v.validate_order(&stock_order("HP-404", "Fantôme", dec!(1400))).await.is_err());
    }

    #[tokio::test]
    async fn custom_floor_uses_notes_and_size_malus() {
        let v = validator();
        // 9 notes × 115 = 1035, already a multiple of 5.
        assert!(v.validate_order(&custom_order(dec!(1035), Some(9), None)).await.is_ok());
        assert!(v.validate_order(&custom_order(dec!(1030), Some(9), None)).await.is_err());
        // Above the floor is a legitimate configuration surcharge.
        assert!(v.validate_order(&custom_order(dec!(1200), Some(9), None)).await.is_ok());
        // Compact shell adds its malus: 1035 + 100 = 1135.
        assert!(v.validate_order(&custom_order(dec!(1135), Some(9), Some("compact"))).await.is_ok());
        assert!(v.validate_order(&custom_order(dec!(1035), Some(9), Some("compact"))).await.is_err());
    }

    #[tokio::test]
    async fn out_of_range_note_count_prices_at_minimum() {
        let v = validator();
        // 25 notes is unsupported; the floor degrades to the 9-note price.
        assert!(v.validate_order(&custom_order(dec!(1035), Some(25), None)).await.is_ok());
        assert!(v.validate_order(&custom_order(dec!(1035), None, None)).await.is_ok());
        assert!(v.validate_order(&custom_order(dec!(900), Some(25), None)).await.is_err());
    }

    #[tokio::test]
    async fn case_option_validates_against_its_own_price() {
        let v = validator();
        let with_case = |case_price: Decimal| {
            OrderSource::Legacy(OrderData {
                origin: OrderOrigin::Stock,
                instrument_id: Some("HP-1".to_string()),
                name: "Atlas".to_string(),
                price: dec!(1400),
                details: ItemDetails::default(),
                shipping_method: None,
                case_option: Some(OrderOption {
                    kind: "case".to_string(),
                    id: "case-std".to_string(),
                    name: "Housse standard".to_string(),
                    price: case_price,
                }),
            })
        };

        assert!(v.validate_order(&with_case(dec!(60))).await.is_ok());
        let err = v.validate_order(&with_case(dec!(10))).await.unwrap_err();
        match err {
            ServiceError::PriceIntegrity(msg) => assert!(msg.contains("Housse")),
            other => panic!("expected price integrity error, got {:?}", other),
        }
    }
}
