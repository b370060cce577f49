//! # Receipt Builder
//!
//! Renders a completed sale into an immutable receipt document. The document
//! is built entirely from the sale's captured snapshot fields, so later
//! catalog edits (renames, price changes, tax changes) can never alter what
//! a stored receipt says.
//!
//! Receipts serialize to JSON for storage and carry both raw cents and
//! display-formatted amounts so printers and web clients don't redo money
//! formatting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Payment, PaymentMethod, Sale, SaleItem};

/// One printed line of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptLine {
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub unit_price: String,
    /// Line plus order-level discount applied to this line.
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub total: String,
}

/// One tender line of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptTender {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub amount: String,
    pub reference: Option<String>,
}

/// A complete, self-contained receipt document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptDocument {
    /// Human-readable number, e.g. `20260715-R1-0042`.
    pub receipt_number: String,
    pub sale_id: String,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    pub lines: Vec<ReceiptLine>,
    pub subtotal_cents: i64,
    pub subtotal: String,
    pub discount_cents: i64,
    pub discount: String,
    pub tax_cents: i64,
    pub tax: String,
    /// Tax already contained in the line prices, shown informationally.
    pub included_tax_cents: i64,
    pub included_tax: String,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub total: String,
    pub tenders: Vec<ReceiptTender>,
    pub paid_cents: i64,
    pub change_cents: i64,
    pub change: String,
    pub coupon_code: Option<String>,
    pub points_redeemed: i64,
    pub points_earned: i64,
}

impl ReceiptDocument {
    /// Builds a receipt from a finalized sale and its captured rows.
    pub fn build(
        sale: &Sale,
        items: &[SaleItem],
        payments: &[Payment],
        receipt_number: &str,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let lines = items
            .iter()
            .map(|item| ReceiptLine {
                sku: item.sku.clone(),
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                unit_price: Money::from_cents(item.unit_price_cents).to_string(),
                discount_cents: item.line_discount_cents + item.order_discount_cents,
                tax_cents: item.tax_cents,
                total_cents: item.total_cents,
                total: Money::from_cents(item.total_cents).to_string(),
            })
            .collect();

        let tenders = payments
            .iter()
            .map(|payment| ReceiptTender {
                method: payment.method,
                amount_cents: payment.amount_cents,
                amount: Money::from_cents(payment.amount_cents).to_string(),
                reference: payment.reference.clone(),
            })
            .collect();

        Self {
            receipt_number: receipt_number.to_string(),
            sale_id: sale.id.clone(),
            issued_at,
            lines,
            subtotal_cents: sale.subtotal_cents,
            subtotal: Money::from_cents(sale.subtotal_cents).to_string(),
            discount_cents: sale.discount_cents,
            discount: Money::from_cents(sale.discount_cents).to_string(),
            tax_cents: sale.tax_cents,
            tax: Money::from_cents(sale.tax_cents).to_string(),
            included_tax_cents: sale.included_tax_cents,
            included_tax: Money::from_cents(sale.included_tax_cents).to_string(),
            shipping_cents: sale.shipping_cents,
            total_cents: sale.total_cents,
            total: Money::from_cents(sale.total_cents).to_string(),
            tenders,
            paid_cents: sale.paid_cents,
            change_cents: sale.change_cents,
            change: Money::from_cents(sale.change_cents).to_string(),
            coupon_code: sale.coupon_code.clone(),
            points_redeemed: sale.points_redeemed,
            points_earned: sale.points_earned,
        }
    }

    /// Serializes the document for storage alongside the sale.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Formats a receipt number: issue date, register, per-register daily
/// sequence.
pub fn format_receipt_number(issued_at: DateTime<Utc>, register_id: &str, sequence: i64) -> String {
    format!(
        "{}-{}-{:04}",
        issued_at.format("%Y%m%d"),
        register_id,
        sequence
    )
}
