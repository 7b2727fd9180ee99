//! Read-only contract with the system of record.
//!
//! The validator only ever needs authoritative prices, sale status, discounts
//! and per-size maluses; everything else about catalog management lives in
//! another system. The in-memory implementation is seeded from a JSON file at
//! startup and built directly in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentStatus {
    Available,
    Reserved,
    Sold,
}

impl InstrumentStatus {
    pub fn is_sellable(&self) -> bool {
        matches!(self, Self::Available)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogInstrument {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub status: InstrumentStatus,
    /// Active percentage discount, if any
    #[serde(default)]
    pub discount_percent: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogAccessory {
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn instrument(&self, id: &str) -> Result<Option<CatalogInstrument>, ServiceError>;
    async fn accessory(&self, id: &str) -> Result<Option<CatalogAccessory>, ServiceError>;
    /// Price malus for a shell size code; unknown codes price as zero.
    async fn size_malus(&self, code: &str) -> Result<Decimal, ServiceError>;
}

/// JSON seed shape for [`InMemoryCatalog::from_file`].
#[derive(Debug, Default, Deserialize)]
struct CatalogSeed {
    #[serde(default)]
    instruments: Vec<CatalogInstrument>,
    #[serde(default)]
    accessories: Vec<CatalogAccessory>,
    #[serde(default)]
    size_maluses: HashMap<String, Decimal>,
}

#[derive(Default)]
pub struct InMemoryCatalog {
    instruments: DashMap<String, CatalogInstrument>,
    accessories: DashMap<String, CatalogAccessory>,
    size_maluses: DashMap<String, Decimal>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let seed: CatalogSeed = serde_json::from_str(&raw)?;
        let catalog = Self::new();
        for instrument in seed.instruments {
            catalog.insert_instrument(instrument);
        }
        for accessory in seed.accessories {
            catalog.insert_accessory(accessory);
        }
        for (code, malus) in seed.size_maluses {
            catalog.set_size_malus(code, malus);
        }
        Ok(catalog)
    }

    pub fn insert_instrument(&self, instrument: CatalogInstrument) {
        self.instruments.insert(instrument.id.clone(), instrument);
    }

    pub fn insert_accessory(&self, accessory: CatalogAccessory) {
        self.accessories.insert(accessory.id.clone(), accessory);
    }

    pub fn set_size_malus(&self, code: impl Into<String>, malus: Decimal) {
        self.size_maluses.insert(code.into(), malus);
    }
}

#[async_trait]
impl CatalogProvider for InMemoryCatalog {
    async fn instrument(&self, id: &str) -> Result<Option<CatalogInstrument>, ServiceError> {
        Ok(self.instruments.get(id).map(|e| e.value().clone()))
    }

    async fn accessory(&self, id: &str) -> Result<Option<CatalogAccessory>, ServiceError> {
        Ok(self.accessories.get(id).map(|e| e.value().clone()))
    }

    async fn size_malus(&self, code: &str) -> Result<Decimal, ServiceError> {
        Ok(self
            .size_maluses
            .get(code)
            .map(|e| *e.value())
            .unwrap_or(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn lookups_and_defaults() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_instrument(CatalogInstrument {
            id: "HP-1".to_string(),
            name: "Atlas D minor".to_string(),
            price: dec!(1400),
            status: InstrumentStatus::Available,
            discount_percent: None,
        });
        catalog.set_size_malus("compact", dec!(100));

        assert!(catalog.instrument("HP-1").await.unwrap().is_some());
        assert!(catalog.instrument("HP-404").await.unwrap().is_none());
        assert_eq!(catalog.size_malus("compact").await.unwrap(), dec!(100));
        assert_eq!(catalog.size_malus("unknown").await.unwrap(), dec!(0));
    }

    #[test]
    fn seed_parses() {
        let seed = r#"{
            "instruments": [
                {"id": "HP-1", "name": "Atlas", "price": "1400", "status": "available"}
            ],
            "accessories": [
                {"id": "case-std", "name": "Housse standard", "price": "60"}
            ],
            "size_maluses": {"compact": "100"}
        }"#;
        let parsed: CatalogSeed = serde_json::from_str(seed).unwrap();
        assert_eq!(parsed.instruments.len(), 1);
        assert_eq!(parsed.accessories.len(), 1);
        assert_eq!(parsed.size_maluses["compact"], dec!(100));
    }
}
