use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// What a line item is, across both entry paths.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemKind {
    Instrument,
    Accessory,
    Custom,
}

/// Shipping choice. `retrait` is pickup at the workshop.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ShippingMethod {
    Colissimo,
    #[serde(rename = "retrait")]
    #[strum(serialize = "retrait")]
    Pickup,
}

/// Where an order's items come from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderOrigin {
    Stock,
    Custom,
    Mixed,
}

/// Payment mode selected by the customer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentType {
    Full,
    Deposit,
    #[serde(rename = "installment_3x")]
    #[strum(serialize = "installment_3x")]
    Installment3x,
    #[serde(rename = "installment_4x")]
    #[strum(serialize = "installment_4x")]
    Installment4x,
    /// Order confirmed at an in-person appointment; no card payment.
    Appointment,
}

impl PaymentType {
    pub fn installment_count(&self) -> Option<u32> {
        match self {
            Self::Installment3x => Some(3),
            Self::Installment4x => Some(4),
            _ => None,
        }
    }
}

/// Configuration attributes of a custom build (all optional; missing values
/// degrade to defaults rather than failing the order).
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ItemDetails {
    /// Scale family (gamme)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    /// Shell size code (taille); maps to a price malus in the catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tonality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_count: Option<u8>,
}

/// An add-on tied to one item (e.g. a protective case). Its price validates
/// independently against the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderOption {
    /// Option family, e.g. "case"
    pub kind: String,
    pub id: String,
    pub name: String,
    pub price: Decimal,
}

/// One cart line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: String,
    pub kind: ItemKind,
    /// Catalog id for stock instruments and accessories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// `unit_price * quantity`, before options
    pub line_total: Decimal,
    #[serde(default)]
    pub details: ItemDetails,
    #[serde(default)]
    pub options: Vec<OrderOption>,
}

impl OrderItem {
    pub fn options_total(&self) -> Decimal {
        self.options.iter().map(|o| o.price).sum()
    }

    /// Line total including options.
    pub fn full_total(&self) -> Decimal {
        self.line_total + self.options_total()
    }
}

/// Legacy single-item order, flattened from URL parameters.
///
/// Exactly one of the two shapes holds: `origin == Stock` carries an
/// `instrument_id`, `origin == Custom` carries configuration details.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderData {
    pub origin: OrderOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub details: ItemDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_method: Option<ShippingMethod>,
    /// Optional case add-on (housse)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_option: Option<OrderOption>,
}

/// Normalized cart view. Derived, never hand-edited: totals and origin are
/// recomputed from the items on construction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartSnapshot {
    pub items: Vec<OrderItem>,
    pub total_price: Decimal,
    pub item_count: u32,
    pub source: OrderOrigin,
}

impl CartSnapshot {
    pub fn from_items(mut items: Vec<OrderItem>) -> Self {
        for item in &mut items {
            item.line_total = item.unit_price * Decimal::from(item.quantity);
        }
        let total_price = items.iter().map(|i| i.full_total()).sum();
        let item_count = items.iter().map(|i| i.quantity).sum();
        let source = Self::derive_origin(&items);
        Self {
            items,
            total_price,
            item_count,
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn derive_origin(items: &[OrderItem]) -> OrderOrigin {
        let any_custom = items.iter().any(|i| i.kind == ItemKind::Custom);
        let any_stock = items.iter().any(|i| i.kind != ItemKind::Custom);
        match (any_stock, any_custom) {
            (true, true) => OrderOrigin::Mixed,
            (false, true) => OrderOrigin::Custom,
            _ => OrderOrigin::Stock,
        }
    }
}

/// The one discriminated union pricing consumes, whichever way the order was
/// composed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OrderSource {
    Legacy(OrderData),
    Cart(CartSnapshot),
}

impl OrderSource {
    /// Normalize to a flat item list; the legacy shape becomes one item with
    /// its optional case attached as an option.
    pub fn normalized_items(&self) -> Vec<OrderItem> {
        match self {
            Self::Cart(cart) => cart.items.clone(),
            Self::Legacy(data) => {
                let kind = match data.origin {
                    OrderOrigin::Custom => ItemKind::Custom,
                    _ => ItemKind::Instrument,
                };
                vec![OrderItem {
                    id: "legacy".to_string(),
                    kind,
                    source_id: data.instrument_id.clone(),
                    name: data.name.clone(),
                    unit_price: data.price,
                    quantity: 1,
                    line_total: data.price,
                    details: data.details.clone(),
                    options: data.case_option.clone().into_iter().collect(),
                }]
            }
        }
    }

    /// Items total including options, before shipping.
    pub fn items_total(&self) -> Decimal {
        self.normalized_items().iter().map(|i| i.full_total()).sum()
    }

    /// Shipping preference embedded in the legacy shape, if any. Cart mode
    /// carries its shipping choice alongside, not inside, the snapshot.
    pub fn embedded_shipping(&self) -> Option<ShippingMethod> {
        match self {
            Self::Legacy(data) => data.shipping_method,
            Self::Cart(_) => None,
        }
    }
}

/// Customer identity and contact info attached to a payment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerInfo {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<PostalAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostalAddress {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub postcode: String,
    pub city: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "FR".to_string()
}

impl PostalAddress {
    pub fn is_complete(&self) -> bool {
        !self.line1.trim().is_empty()
            && !self.postcode.trim().is_empty()
            && !self.city.trim().is_empty()
    }
}

/// Snapshot bridging the redirect round-trip: written after a payment is
/// created, consumed by the return reconciler on success, left in place on
/// cancel so a retry can reuse it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingOrder {
    pub reference: String,
    pub customer: CustomerInfo,
    pub cart_items: Vec<OrderItem>,
    pub payment_type: PaymentType,
    pub paid_amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_method: Option<ShippingMethod>,
    pub shipping_cost: Decimal,
    pub created_at: DateTime<Utc>,
}
