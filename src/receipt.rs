//! Receipt document model.
//!
//! Normalizes a raw feed order plus shop settings into the printable,
//! currency- and VAT-consistent line model both renderers consume. The
//! build is total — malformed address JSON, missing optionals, and
//! non-finite numbers degrade to empty strings or zero, never to an
//! error.
//!
//! VAT assumes tax-inclusive gross pricing: `vat = gross - gross/(1+rate)`,
//! applied once to the food portion (order total minus delivery fee and
//! tip, i.e. after any coupon discount) at the reduced rate, and once to
//! the delivery fee at the standard rate when the order is a delivery
//! with a non-zero fee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{Address, DeliveryMethod, Order};
use crate::settings::PrintSettings;

/// The two tax-inclusive VAT rates, as decimals (e.g. 0.07 / 0.19).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VatRates {
    pub reduced: f64,
    pub standard: f64,
}

/// Shop identity block printed in the header and footer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShopIdentity {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub thank_you: String,
}

/// One printable extra line under an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraLine {
    pub name: String,
    pub price: f64,
}

/// One flattened printable order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: u32,
    pub size: Option<String>,
    pub extras: Vec<ExtraLine>,
    /// Quantity × unit price plus extras, rounded to cents.
    pub line_total: f64,
}

/// Coupon adjustment re-added for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponLine {
    pub code: String,
    pub discount: f64,
}

/// Net/VAT split of one tax-inclusive gross portion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortionVat {
    pub gross: f64,
    pub net: f64,
    pub vat: f64,
    pub rate: f64,
}

impl PortionVat {
    /// Split a gross amount at a tax-inclusive rate. The VAT share is
    /// rounded to cents and the net defined as `gross - vat`, so
    /// `net + vat == gross` holds exactly.
    fn split(gross: f64, rate: f64) -> Self {
        let gross = round_cents(gross);
        let vat = round_cents(gross - gross / (1.0 + rate));
        Self {
            gross,
            net: round_cents(gross - vat),
            vat,
            rate,
        }
    }
}

/// VAT breakdown across the order's portions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VatBreakdown {
    pub food: PortionVat,
    /// Present only for deliveries with a non-zero fee.
    pub delivery: Option<PortionVat>,
}

/// Customer block, possibly empty.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CustomerBlock {
    pub name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
}

impl CustomerBlock {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.phone.is_empty()
            && self.street.is_empty()
            && self.city.is_empty()
    }
}

/// The printable receipt, immutable once built. Both the ESC/POS encoder
/// and the HTML renderer consume exactly this model, so their totals and
/// VAT split agree by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptDocument {
    pub shop: ShopIdentity,
    pub order_id: String,
    pub placed_at: String,
    pub printed_at: String,
    pub status: String,
    pub delivery_method: DeliveryMethod,
    /// Requested time, present only for scheduled orders.
    pub scheduled_for: Option<String>,
    pub customer: CustomerBlock,
    pub lines: Vec<ReceiptLine>,
    /// Pre-coupon item subtotal.
    pub items_total: f64,
    pub coupon: Option<CouponLine>,
    pub delivery_fee: f64,
    pub tip: f64,
    pub total: f64,
    pub vat: VatBreakdown,
}

/// Format a monetary amount with two decimals. Shared by both renderers.
pub fn money(value: f64) -> String {
    format!("{value:.2}")
}

/// Format a VAT rate as a percent label, e.g. `7%` or `8.1%`. Shared by
/// both renderers so the breakdown reads identically.
pub fn rate_label(rate: f64) -> String {
    let pct = rate * 100.0;
    if (pct.round() - pct).abs() < 1e-9 {
        format!("{pct:.0}%")
    } else {
        format!("{pct:.1}%")
    }
}

fn round_cents(value: f64) -> f64 {
    (sane(value) * 100.0).round() / 100.0
}

fn sane(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn format_timestamp(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// Build the receipt document for an order.
pub fn build_receipt(order: &Order, settings: &PrintSettings, rates: VatRates) -> ReceiptDocument {
    let lines: Vec<ReceiptLine> = order
        .items
        .iter()
        .map(|item| {
            let extras: Vec<ExtraLine> = item
                .extras
                .iter()
                .map(|e| ExtraLine {
                    name: e.name.clone(),
                    price: round_cents(e.price),
                })
                .collect();
            let extras_total: f64 = extras.iter().map(|e| e.price).sum();
            ReceiptLine {
                name: item.name.clone(),
                quantity: item.quantity.max(1),
                size: item.size.clone(),
                line_total: round_cents(
                    item.quantity.max(1) as f64 * sane(item.price) + extras_total,
                ),
                extras,
            }
        })
        .collect();

    let items_total = round_cents(lines.iter().map(|l| l.line_total).sum());
    let total = round_cents(order.total);
    let delivery_fee = round_cents(order.delivery_fee);
    let tip = round_cents(order.tip);

    let coupon = order
        .coupon_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| CouponLine {
            code: code.to_string(),
            discount: round_cents((items_total + delivery_fee + tip - total).max(0.0)),
        });

    let food_gross = (total - delivery_fee - tip).max(0.0);
    let delivery = (order.delivery_method == DeliveryMethod::Delivery && delivery_fee > 0.0)
        .then(|| PortionVat::split(delivery_fee, rates.standard));

    let address = Address::parse(order.address_json.as_deref());
    let customer = CustomerBlock {
        name: if address.name.is_empty() {
            order.customer_name.clone().unwrap_or_default()
        } else {
            address.name
        },
        phone: address.phone,
        street: address.street,
        city: address.city,
    };

    ReceiptDocument {
        shop: ShopIdentity {
            name: settings.shop_name.clone(),
            address: settings.shop_address.clone(),
            phone: settings.shop_phone.clone(),
            thank_you: settings.thank_you_message.clone(),
        },
        order_id: order.id.clone(),
        placed_at: format_timestamp(&order.created_at),
        printed_at: Utc::now().format("%Y-%m-%d %H:%M").to_string(),
        status: order.status.clone(),
        delivery_method: order.delivery_method,
        scheduled_for: order
            .is_scheduled
            .then(|| order.requested_time.clone().unwrap_or_default()),
        customer,
        lines,
        items_total,
        coupon,
        delivery_fee,
        tip,
        total,
        vat: VatBreakdown {
            food: PortionVat::split(food_gross, rates.reduced),
            delivery,
        },
    }
}
