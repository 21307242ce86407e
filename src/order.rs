//! Wire shapes of the polled order feed.
//!
//! The feed is a read-only external collaborator; these types tolerate
//! sparse rows (every optional field defaults) so a malformed or partial
//! order never aborts a poll cycle.

use serde::{Deserialize, Serialize};

/// How the order leaves the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryMethod {
    Delivery,
    #[default]
    Pickup,
    #[serde(other)]
    Other,
}

impl DeliveryMethod {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryMethod::Delivery => "Delivery",
            DeliveryMethod::Pickup => "Pickup",
            DeliveryMethod::Other => "Other",
        }
    }
}

/// A priced add-on attached to an order line.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Extra {
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

/// One line of an order as delivered by the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Resolved display name of the product or combo.
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Unit price, tax-inclusive.
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub extras: Vec<Extra>,
}

fn default_quantity() -> u32 {
    1
}

/// An order summary as delivered by the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub delivery_fee: f64,
    #[serde(default)]
    pub tip: f64,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub is_scheduled: bool,
    #[serde(default)]
    pub requested_time: Option<String>,
    /// Serialized address blob; parsed leniently, see [`Address::parse`].
    #[serde(default)]
    pub address_json: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub customer_name: Option<String>,
}

/// Customer address fields, all optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Address {
    pub name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
}

impl Address {
    /// Parse the serialized address blob. Absent or malformed JSON yields
    /// empty fields, never an error.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }
}
