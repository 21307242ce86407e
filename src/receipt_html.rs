//! HTML receipt renderer for pixel (non-thermal) printers.
//!
//! Produces one self-contained document with embedded print CSS. The
//! `@page` geometry comes from the paper format registry — sheet formats
//! get their fixed size, thermal formats continuous height. The logical
//! sections mirror the ESC/POS layout and both paths consume the same
//! [`ReceiptDocument`], so the printed numbers agree to the cent.

use crate::formats::PaperFormat;
use crate::receipt::{money, rate_label, ReceiptDocument};
use crate::settings::FontSize;

fn esc(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn page_css(format: &PaperFormat) -> String {
    match format.height_mm {
        Some(height) => format!(
            "@page {{ size: {}mm {}mm; margin: 12mm; }}",
            format.width_mm, height
        ),
        // Continuous thermal roll: fixed width, auto height.
        None => format!(
            "@page {{ size: {}mm auto; margin: 2mm; }} body {{ width: {}mm; }}",
            format.width_mm,
            format.width_mm.saturating_sub(4)
        ),
    }
}

fn html_shell(title: &str, format: &PaperFormat, font_size: FontSize, body: &str) -> String {
    let base_px = font_size.base_px();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8"/>
<title>{}</title>
<style>
{}
body {{ font-family: ui-monospace, SFMono-Regular, Menlo, monospace; margin: 0 auto; padding: 8px; background: #fff; color: #111; font-size: {}px; }}
h1 {{ font-size: {}px; margin: 0; text-align: center; }}
.line {{ display: flex; justify-content: space-between; gap: 8px; }}
.line strong {{ font-size: {}px; }}
.section {{ margin-top: 8px; border-top: 1px dashed #111; padding-top: 6px; }}
.scheduled {{ border: 2px solid #111; text-align: center; font-weight: bold; font-size: {}px; padding: 6px; margin-top: 8px; }}
table {{ width: 100%; border-collapse: collapse; }}
td {{ padding: 1px 0; vertical-align: top; }}
td.amount {{ text-align: right; white-space: nowrap; }}
.note {{ color: #666; font-size: {}px; }}
.center {{ text-align: center; }}
.total {{ font-size: {}px; font-weight: bold; text-align: right; }}
</style>
</head>
<body>{}</body>
</html>"#,
        esc(title),
        page_css(format),
        base_px,
        base_px + 4,
        base_px + 1,
        base_px + 3,
        base_px.saturating_sub(2),
        base_px + 5,
        body
    )
}

fn meta_row(body: &mut String, label: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    body.push_str(&format!(
        "<div class=\"line\"><span>{}</span><span>{}</span></div>",
        esc(label),
        esc(value)
    ));
}

fn amount_row(body: &mut String, label: &str, value: &str) {
    body.push_str(&format!(
        "<div class=\"line\"><span>{}</span><span>{}</span></div>",
        esc(label),
        esc(value)
    ));
}

/// Render the receipt as a self-contained printable HTML document.
pub fn render_html(doc: &ReceiptDocument, format: &PaperFormat, font_size: FontSize) -> String {
    let mut body = String::with_capacity(4096);

    // Shop header
    if !doc.shop.name.is_empty() {
        body.push_str(&format!("<h1>{}</h1>", esc(&doc.shop.name)));
    }
    if !doc.shop.address.is_empty() {
        body.push_str(&format!("<div class=\"center\">{}</div>", esc(&doc.shop.address)));
    }
    if !doc.shop.phone.is_empty() {
        body.push_str(&format!("<div class=\"center\">{}</div>", esc(&doc.shop.phone)));
    }

    // Order metadata
    body.push_str("<div class=\"section\">");
    meta_row(&mut body, "Order", &doc.order_id);
    meta_row(&mut body, "Placed", &doc.placed_at);
    meta_row(&mut body, "Type", doc.delivery_method.label());
    meta_row(&mut body, "Status", &doc.status);
    body.push_str("</div>");

    if let Some(when) = &doc.scheduled_for {
        body.push_str(&format!(
            "<div class=\"scheduled\">SCHEDULED FOR<br/>{}</div>",
            esc(when)
        ));
    }

    // Customer
    if !doc.customer.is_empty() {
        body.push_str("<div class=\"section\">");
        meta_row(&mut body, "Name", &doc.customer.name);
        meta_row(&mut body, "Phone", &doc.customer.phone);
        meta_row(&mut body, "Street", &doc.customer.street);
        meta_row(&mut body, "City", &doc.customer.city);
        body.push_str("</div>");
    }

    // Items
    body.push_str("<div class=\"section\"><table>");
    for line in &doc.lines {
        let name = match line.size.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(size) => format!("{} ({})", line.name, size),
            None => line.name.clone(),
        };
        body.push_str(&format!(
            "<tr><td>{}x {}</td><td class=\"amount\">{}</td></tr>",
            line.quantity,
            esc(&name),
            money(line.line_total)
        ));
        for extra in &line.extras {
            let price = if extra.price > 0.0 {
                money(extra.price)
            } else {
                String::new()
            };
            body.push_str(&format!(
                "<tr><td class=\"note\">&nbsp;&nbsp;+ {}</td><td class=\"amount note\">{}</td></tr>",
                esc(&extra.name),
                price
            ));
        }
    }
    body.push_str("</table></div>");

    // Amounts and VAT breakdown
    body.push_str("<div class=\"section\">");
    amount_row(&mut body, "Subtotal", &money(doc.items_total));
    if let Some(coupon) = &doc.coupon {
        amount_row(
            &mut body,
            &format!("Coupon ({})", coupon.code),
            &format!("-{}", money(coupon.discount)),
        );
    }
    if doc.delivery_fee > 0.0 {
        amount_row(&mut body, "Delivery fee", &money(doc.delivery_fee));
    }
    if doc.tip > 0.0 {
        amount_row(&mut body, "Tip", &money(doc.tip));
    }
    amount_row(&mut body, "Food net", &money(doc.vat.food.net));
    amount_row(
        &mut body,
        &format!("VAT {}", rate_label(doc.vat.food.rate)),
        &money(doc.vat.food.vat),
    );
    if let Some(delivery) = &doc.vat.delivery {
        amount_row(&mut body, "Delivery net", &money(delivery.net));
        amount_row(
            &mut body,
            &format!("VAT {}", rate_label(delivery.rate)),
            &money(delivery.vat),
        );
    }
    body.push_str("</div>");

    // Total
    body.push_str(&format!(
        "<div class=\"section\"><div class=\"total\">TOTAL {}</div>\
         <div class=\"note\" style=\"text-align:right\">incl. VAT</div></div>",
        money(doc.total)
    ));

    // Footer
    body.push_str("<div class=\"section center\">");
    if !doc.shop.thank_you.is_empty() {
        body.push_str(&format!("<div>{}</div>", esc(&doc.shop.thank_you)));
    }
    body.push_str(&format!("<div class=\"note\">{}</div>", esc(&doc.printed_at)));
    body.push_str("</div>");

    html_shell("Order Receipt", format, font_size, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escpos::encode_receipt;
    use crate::formats;
    use crate::order::DeliveryMethod;
    use crate::receipt::build_receipt;
    use crate::receipt::tests::{sample_order, RATES};
    use crate::settings::PrintSettings;

    fn sample_doc() -> ReceiptDocument {
        build_receipt(&sample_order(), &PrintSettings::default(), RATES)
    }

    #[test]
    fn test_html_is_self_contained_document() {
        let html = render_html(&sample_doc(), formats::lookup("A4"), FontSize::Medium);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<style>"));
        assert!(html.ends_with("</html>"));
    }

    #[test]
    fn test_sheet_format_declares_fixed_page_size() {
        let html = render_html(&sample_doc(), formats::lookup("A4"), FontSize::Medium);
        assert!(html.contains("@page { size: 210mm 297mm;"));
    }

    #[test]
    fn test_thermal_format_declares_continuous_height() {
        let html = render_html(&sample_doc(), formats::lookup("THERMAL_58MM"), FontSize::Medium);
        assert!(html.contains("@page { size: 58mm auto;"));
    }

    #[test]
    fn test_html_and_escpos_agree_on_totals_and_vat() {
        let doc = sample_doc();
        let html = render_html(&doc, formats::lookup("A4"), FontSize::Medium);
        let raw = encode_receipt(&doc, formats::lookup("THERMAL_80MM"), true);
        for needle in ["TOTAL 255.00", "16.68", "VAT 7%"] {
            assert!(html.contains(needle), "html missing {needle}");
            assert!(raw.contains(needle), "escpos missing {needle}");
        }
    }

    #[test]
    fn test_same_document_across_formats_differs_only_in_geometry() {
        let doc = sample_doc();
        let narrow = render_html(&doc, formats::lookup("THERMAL_58MM"), FontSize::Medium);
        let sheet = render_html(&doc, formats::lookup("A4"), FontSize::Medium);
        for needle in ["2x Margarita", "TOTAL 255.00", "16.68"] {
            assert!(narrow.contains(needle));
            assert!(sheet.contains(needle));
        }
        assert!(narrow.contains("58mm auto"));
        assert!(sheet.contains("210mm 297mm"));
    }

    #[test]
    fn test_delivery_vat_line_absent_without_delivery() {
        let html = render_html(&sample_doc(), formats::lookup("A4"), FontSize::Medium);
        assert!(!html.contains("Delivery net"));
    }

    #[test]
    fn test_delivery_vat_line_present_for_delivery() {
        let mut order = sample_order();
        order.delivery_method = DeliveryMethod::Delivery;
        order.delivery_fee = 5.0;
        order.total = 260.0;
        let doc = build_receipt(&order, &PrintSettings::default(), RATES);
        let html = render_html(&doc, formats::lookup("A4"), FontSize::Medium);
        assert!(html.contains("Delivery net"));
        assert!(html.contains("VAT 19%"));
    }

    #[test]
    fn test_tip_line_only_when_present() {
        let html = render_html(&sample_doc(), formats::lookup("A4"), FontSize::Medium);
        assert!(!html.contains("Tip"));

        let mut order = sample_order();
        order.tip = 2.5;
        order.total = 257.5;
        let doc = build_receipt(&order, &PrintSettings::default(), RATES);
        let html = render_html(&doc, formats::lookup("A4"), FontSize::Medium);
        assert!(html.contains("Tip"));
        assert!(html.contains("2.50"));
    }

    #[test]
    fn test_scheduled_box_only_when_scheduled() {
        let html = render_html(&sample_doc(), formats::lookup("A4"), FontSize::Medium);
        assert!(!html.contains("SCHEDULED FOR"));

        let mut order = sample_order();
        order.is_scheduled = true;
        order.requested_time = Some("19:45".to_string());
        let doc = build_receipt(&order, &PrintSettings::default(), RATES);
        let html = render_html(&doc, formats::lookup("A4"), FontSize::Medium);
        assert!(html.contains("SCHEDULED FOR"));
    }

    #[test]
    fn test_interpolated_text_is_escaped() {
        let mut order = sample_order();
        order.items[0].name = "Chili & Cheese <Hot>".to_string();
        let doc = build_receipt(&order, &PrintSettings::default(), RATES);
        let html = render_html(&doc, formats::lookup("A4"), FontSize::Medium);
        assert!(html.contains("Chili &amp; Cheese &lt;Hot&gt;"));
        assert!(!html.contains("<Hot>"));
    }

    #[test]
    fn test_font_size_presets_change_base_size() {
        let doc = sample_doc();
        let small = render_html(&doc, formats::lookup("A4"), FontSize::Small);
        let large = render_html(&doc, formats::lookup("A4"), FontSize::Large);
        assert!(small.contains("font-size: 10px"));
        assert!(large.contains("font-size: 14px"));
    }
}
