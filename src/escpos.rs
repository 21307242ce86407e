//! ESC/POS command stream encoder for thermal receipt tickets.
//!
//! Emits the printer's literal control sequences interleaved with ticket
//! text as an ordered list of segments; `build()` concatenates them into
//! the single raw payload handed to the broker. The encoder is total —
//! missing fields skip their block, missing numbers print as zero, and no
//! command is ever reordered.

use crate::formats::PaperFormat;
use crate::receipt::{money, rate_label, ReceiptDocument};

const ESC: char = '\u{1B}';
const GS: char = '\u{1D}';

/// Fixed divider width in characters.
pub const DIVIDER_WIDTH: usize = 40;

/// `ESC a n` alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

impl Align {
    fn code(self) -> char {
        match self {
            Align::Left => '\u{00}',
            Align::Center => '\u{01}',
            Align::Right => '\u{02}',
        }
    }
}

/// `ESC ! n` text mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// n = 0x00
    Normal,
    /// n = 0x08 (emphasized)
    Bold,
    /// n = 0x38 (double height + double width + emphasized)
    DoubleSize,
}

impl TextMode {
    fn code(self) -> char {
        match self {
            TextMode::Normal => '\u{00}',
            TextMode::Bold => '\u{08}',
            TextMode::DoubleSize => '\u{38}',
        }
    }
}

/// Builder collecting ESC/POS command and text segments in emit order.
///
/// ```rust,ignore
/// let payload = EscPosBuilder::new(48)
///     .init()
///     .align(Align::Center)
///     .line("RECEIPT")
///     .cut()
///     .build();
/// ```
pub struct EscPosBuilder {
    parts: Vec<String>,
    columns: usize,
}

impl EscPosBuilder {
    pub fn new(columns: usize) -> Self {
        Self {
            parts: Vec::with_capacity(64),
            columns: columns.max(8),
        }
    }

    /// ESC @ — initialize the printer, reset to defaults.
    pub fn init(&mut self) -> &mut Self {
        self.parts.push(format!("{ESC}@"));
        self
    }

    /// ESC a n — set alignment.
    pub fn align(&mut self, align: Align) -> &mut Self {
        self.parts.push(format!("{ESC}a{}", align.code()));
        self
    }

    /// ESC ! n — set text mode.
    pub fn mode(&mut self, mode: TextMode) -> &mut Self {
        self.parts.push(format!("{ESC}!{}", mode.code()));
        self
    }

    /// Append raw text without a trailing newline.
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.parts.push(s.to_string());
        self
    }

    /// Append a text line.
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.parts.push(format!("{s}\n"));
        self
    }

    /// Fixed-width dash divider.
    pub fn divider(&mut self) -> &mut Self {
        self.parts.push(format!("{}\n", "-".repeat(DIVIDER_WIDTH)));
        self
    }

    /// Left-aligned label with the value pushed to the right margin.
    /// Overlong labels wrap onto their own lines with the value alone on
    /// the last line.
    pub fn pair(&mut self, label: &str, value: &str) -> &mut Self {
        let label_len = label.chars().count();
        let value_len = value.chars().count();
        if label_len + value_len < self.columns {
            let gap = self.columns - label_len - value_len;
            self.parts
                .push(format!("{label}{}{value}\n", " ".repeat(gap)));
        } else {
            for piece in wrap(label, self.columns) {
                self.parts.push(format!("{piece}\n"));
            }
            let gap = self.columns.saturating_sub(value_len);
            self.parts.push(format!("{}{value}\n", " ".repeat(gap)));
        }
        self
    }

    /// Feed n blank lines.
    pub fn blank(&mut self, n: usize) -> &mut Self {
        self.parts.push("\n".repeat(n));
        self
    }

    /// GS V 0 — full paper cut.
    pub fn cut(&mut self) -> &mut Self {
        self.parts.push(format!("{GS}V{}", '\u{00}'));
        self
    }

    /// The ordered segments collected so far.
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Concatenate all segments into the raw payload.
    pub fn build(self) -> String {
        self.parts.concat()
    }
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(8);
    let mut out = Vec::new();
    let mut line = String::new();
    for token in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(token);
            continue;
        }
        if line.chars().count() + 1 + token.chars().count() > width {
            out.push(line);
            line = token.to_string();
        } else {
            line.push(' ');
            line.push_str(token);
        }
    }
    if !line.is_empty() {
        out.push(line);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

fn item_label(line: &crate::receipt::ReceiptLine) -> String {
    match line.size.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(size) => format!("{}x {} ({})", line.quantity, line.name, size),
        None => format!("{}x {}", line.quantity, line.name),
    }
}

/// Bold label, normal value, padded across the line.
fn meta_pair(b: &mut EscPosBuilder, label: &str, value: &str, columns: usize) {
    b.mode(TextMode::Bold).text(label).mode(TextMode::Normal);
    let gap = columns
        .saturating_sub(label.chars().count() + value.chars().count())
        .max(1);
    b.text(&" ".repeat(gap));
    b.line(value);
}

/// Encode a receipt document into the raw ESC/POS payload.
///
/// The emit order is fixed; conditional blocks (scheduled marker,
/// customer, coupon, delivery VAT, cut) are skipped when their data is
/// absent and never reordered.
pub fn encode_receipt(doc: &ReceiptDocument, format: &PaperFormat, auto_cut: bool) -> String {
    let columns = format.columns();
    let mut b = EscPosBuilder::new(columns);

    b.init();

    // Shop header
    b.align(Align::Center).mode(TextMode::DoubleSize);
    if !doc.shop.name.is_empty() {
        b.line(&doc.shop.name);
    }
    b.mode(TextMode::Normal);
    if !doc.shop.address.is_empty() {
        b.line(&doc.shop.address);
    }
    if !doc.shop.phone.is_empty() {
        b.line(&doc.shop.phone);
    }

    b.align(Align::Left);
    b.divider();

    // Order metadata
    meta_pair(&mut b, "Order", &doc.order_id, columns);
    if !doc.placed_at.is_empty() {
        meta_pair(&mut b, "Placed", &doc.placed_at, columns);
    }
    meta_pair(&mut b, "Type", doc.delivery_method.label(), columns);
    if !doc.status.is_empty() {
        meta_pair(&mut b, "Status", &doc.status, columns);
    }

    if let Some(when) = &doc.scheduled_for {
        b.align(Align::Center).mode(TextMode::DoubleSize);
        b.line("SCHEDULED FOR");
        if !when.is_empty() {
            b.line(when);
        }
        b.mode(TextMode::Normal).align(Align::Left);
    }

    b.divider();

    // Customer
    if !doc.customer.is_empty() {
        for value in [
            &doc.customer.name,
            &doc.customer.phone,
            &doc.customer.street,
            &doc.customer.city,
        ] {
            if !value.is_empty() {
                b.line(value);
            }
        }
        b.divider();
    }

    // Items
    for line in &doc.lines {
        b.pair(&item_label(line), &money(line.line_total));
        for extra in &line.extras {
            let label = format!(" + {}", extra.name);
            if extra.price > 0.0 {
                b.pair(&label, &money(extra.price));
            } else {
                b.line(&label);
            }
        }
    }

    b.divider();

    // Amounts and VAT breakdown
    b.pair("Subtotal", &money(doc.items_total));
    if let Some(coupon) = &doc.coupon {
        b.pair(
            &format!("Coupon ({})", coupon.code),
            &format!("-{}", money(coupon.discount)),
        );
    }
    if doc.delivery_fee > 0.0 {
        b.pair("Delivery fee", &money(doc.delivery_fee));
    }
    if doc.tip > 0.0 {
        b.pair("Tip", &money(doc.tip));
    }
    b.pair("Food net", &money(doc.vat.food.net));
    b.pair(
        &format!("VAT {}", rate_label(doc.vat.food.rate)),
        &money(doc.vat.food.vat),
    );
    if let Some(delivery) = &doc.vat.delivery {
        b.pair("Delivery net", &money(delivery.net));
        b.pair(
            &format!("VAT {}", rate_label(delivery.rate)),
            &money(delivery.vat),
        );
    }

    b.divider();

    // Total
    b.align(Align::Right).mode(TextMode::DoubleSize);
    b.line(&format!("TOTAL {}", money(doc.total)));
    b.mode(TextMode::Normal);
    b.line("incl. VAT");
    b.align(Align::Left);

    b.divider();

    // Footer
    b.align(Align::Center);
    if !doc.shop.thank_you.is_empty() {
        b.line(&doc.shop.thank_you);
    }
    b.line(&doc.printed_at);

    b.blank(3);
    if auto_cut {
        b.cut();
    }

    b.build()
}

/// Small self-test ticket for the settings screen.
pub fn test_ticket(format: &PaperFormat) -> String {
    let mut b = EscPosBuilder::new(format.columns());
    b.init()
        .align(Align::Center)
        .mode(TextMode::Bold)
        .line("TEST PRINT")
        .mode(TextMode::Normal)
        .divider()
        .align(Align::Left)
        .line("ABCDEFGHIJKLMNOPQRSTUVWXYZ")
        .line("0123456789 !@#$%^&*()")
        .pair("Left", "Right")
        .divider()
        .align(Align::Center)
        .line("-- End of Test --")
        .blank(3)
        .cut();
    b.build()
}
