//! # Domain Types
//!
//! Core domain types for the POS subsystem.
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where applicable: (sku, coupon code, receipt number) -
//!   human-readable, potentially mutable
//!
//! ## Snapshot Pattern
//! Sale items copy sku/name/price from the catalog at pricing time so a
//! completed sale and its receipt stay readable even if catalog records
//! change or disappear later.
//!
//! All monetary fields are integer cents; all rates are integer basis points.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Enums
// =============================================================================

/// The lifecycle status of a sale.
///
/// Transitions are monotonic: `Draft -> Completed -> Refunded`, with
/// `Voided` reachable only from `Draft`. A sale never returns to `Draft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Unsettled, freely repriceable cart. No inventory/loyalty effect.
    Draft,
    /// Paid and settled; immutable except for the refund transition.
    Completed,
    /// Abandoned before payment.
    Voided,
    /// Every unit on every line has been refunded.
    Refunded,
}

impl SaleStatus {
    /// Lowercase label used in error messages and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Draft => "draft",
            SaleStatus::Completed => "completed",
            SaleStatus::Voided => "voided",
            SaleStatus::Refunded => "refunded",
        }
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Draft
    }
}

/// Where the sale originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleChannel {
    Pos,
    Online,
    Phone,
    Wholesale,
}

impl Default for SaleChannel {
    fn default() -> Self {
        SaleChannel::Pos
    }
}

/// Settlement instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash.
    Cash,
    /// Card captured on an external, pre-authorized terminal.
    Card,
    /// Anything else (gift card, account credit, ...).
    Other,
}

/// How a discount computes its amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is basis points off the eligible amount.
    Percent,
    /// `value` is a fixed number of cents, capped at the eligible amount.
    Fixed,
}

/// Whether a stock row tracks a bare product or a specific variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Product,
    Variant,
}

/// Why a quantity delta was recorded in the inventory ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    Sale,
    Refund,
    Adjustment,
    Purchase,
    TransferIn,
    TransferOut,
    CountAdjustment,
}

/// Kind of loyalty ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyEventKind {
    Earn,
    Redeem,
    Adjust,
}

/// Register session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Closed,
}

// =============================================================================
// Item Reference
// =============================================================================

/// A (kind, id) reference to the sellable unit a stock row or ledger entry
/// tracks: the variant when one exists, otherwise the product itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemRef {
    pub fn product(id: impl Into<String>) -> Self {
        ItemRef {
            kind: ItemKind::Product,
            id: id.into(),
        }
    }

    pub fn variant(id: impl Into<String>) -> Self {
        ItemRef {
            kind: ItemKind::Variant,
            id: id.into(),
        }
    }

    /// The stock identity of a sale line: variant wins over product.
    pub fn for_line(product_id: Option<&str>, variant_id: Option<&str>) -> Option<Self> {
        match (variant_id, product_id) {
            (Some(v), _) => Some(ItemRef::variant(v)),
            (None, Some(p)) => Some(ItemRef::product(p)),
            (None, None) => None,
        }
    }
}

// =============================================================================
// Catalog Records
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Tenant this product belongs to.
    pub tenant_id: String,
    /// Stock Keeping Unit - business identifier.
    pub sku: String,
    /// Display name shown to cashier and on receipt.
    pub name: String,
    /// Base price in cents. Variants may override it.
    pub price_cents: i64,
    /// Taxes attached to this product's lines, by tax id.
    pub tax_ids: Vec<String>,
    /// Service/subscription items are exempt from stock tracking.
    pub is_service: bool,
    /// Routed to the kitchen printer when sold.
    pub is_kitchen: bool,
    /// Requires a birth-date-bearing ID at finalize.
    pub requires_id_check: bool,
    /// Minimum purchaser age when `requires_id_check` is set.
    pub min_age: Option<i64>,
    /// Whether product is active (soft delete).
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A sellable variation of a product (size, color, ...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Variant {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    pub sku: String,
    pub name: String,
    /// Overrides the product base price when set.
    pub price_cents: Option<i64>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A tax record. The rate is a flat basis-points value; jurisdiction rule
/// engines live outside this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Tax {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// Rate in basis points (825 = 8.25%).
    pub rate_bps: u32,
    /// Inclusive taxes are extracted from the price; exclusive taxes are
    /// added on top.
    pub inclusive: bool,
    pub is_active: bool,
}

/// A discount definition: the computation, without a code or window.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Discount {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub kind: DiscountKind,
    /// Basis points for `Percent`, cents for `Fixed`.
    pub value: i64,
    pub is_active: bool,
}

impl Discount {
    /// Cents taken off an eligible amount. Percent discounts round half-up;
    /// both kinds are capped at the eligible amount and floored at zero.
    pub fn amount_off(&self, eligible_cents: i64) -> i64 {
        if eligible_cents <= 0 {
            return 0;
        }
        let raw = match self.kind {
            DiscountKind::Percent => crate::money::percent_of(
                eligible_cents,
                self.value.clamp(0, crate::money::BPS_DENOMINATOR) as u32,
                crate::money::RoundingMode::HalfUp,
            ),
            DiscountKind::Fixed => self.value,
        };
        raw.clamp(0, eligible_cents)
    }
}

/// A coupon wraps a discount with a code, usage limit and validity window.
///
/// Read-mostly: only `usage_count` is ever mutated, atomically, at finalize.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Coupon {
    pub id: String,
    pub tenant_id: String,
    pub code: String,
    pub discount_id: String,
    /// `None` means unlimited use.
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    #[ts(as = "Option<String>")]
    pub starts_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

// =============================================================================
// Sale Aggregate
// =============================================================================

/// The aggregate root of one checkout.
///
/// Invariant after every (re)pricing:
/// `total = subtotal - discount + tax + shipping`, where `tax` counts only
/// exclusive additions (inclusive extractions are reported separately in
/// `included_tax_cents`).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub tenant_id: String,
    pub location_id: Option<String>,
    pub register_session_id: Option<String>,
    pub cashier_id: String,
    pub customer_id: Option<String>,
    pub channel: SaleChannel,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub included_tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub change_cents: i64,
    pub coupon_code: Option<String>,
    pub points_redeemed: i64,
    pub points_earned: i64,
    pub age_verified: bool,
    /// Assigned at finalize; `None` while the sale is a draft.
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// One priced line of a sale. Owned exclusively by its sale; replaced as a
/// set on draft repricing, frozen by stamping `completed_at` at finalize.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    /// SKU at time of sale (frozen).
    pub sku: String,
    /// Name at time of sale (frozen).
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// Per-line discount (explicit override or referenced Discount).
    pub line_discount_cents: i64,
    /// This line's slice of the order-level discount.
    pub order_discount_cents: i64,
    /// Exclusive tax added on top of the taxable amount.
    pub tax_cents: i64,
    /// Inclusive tax extracted from (but not added to) the taxable amount.
    pub included_tax_cents: i64,
    /// Taxable-after-discounts plus exclusive tax.
    pub total_cents: i64,
    pub tax_ids: Vec<String>,
    pub is_service: bool,
    pub is_kitchen: bool,
    pub requires_id_check: bool,
    pub min_age: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Freeze stamp copied from the sale's completion time.
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SaleItem {
    /// The stock identity of this line, `None` for service items.
    pub fn item_ref(&self) -> Option<ItemRef> {
        if self.is_service {
            return None;
        }
        ItemRef::for_line(self.product_id.as_deref(), self.variant_id.as_deref())
    }
}

/// One settlement instrument applied to a completed sale. Multiple payments
/// may fund one sale (split tender).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// External reference (card auth code, etc.).
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Refunds
// =============================================================================

/// A refund against exactly one completed sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Refund {
    pub id: String,
    pub tenant_id: String,
    pub sale_id: String,
    pub cashier_id: String,
    pub reason: Option<String>,
    pub total_cents: i64,
    /// Earned points revoked by this refund.
    pub points_revoked: i64,
    /// Redeemed points restored by this refund.
    pub points_restored: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// One refunded slice of a sale item.
///
/// Invariant: across all refund items for a sale item, refunded quantity
/// never exceeds the original line quantity.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RefundItem {
    pub id: String,
    pub refund_id: String,
    pub sale_item_id: String,
    pub quantity: i64,
    /// Prorated against the original line total.
    pub amount_cents: i64,
    /// Whether the units go back on the shelf.
    pub restock: bool,
}

// =============================================================================
// Inventory
// =============================================================================

/// Current quantity per (tenant, location, item). A derived cache of the
/// inventory ledger's running sum; the two must never diverge.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockOnHand {
    pub tenant_id: String,
    pub location_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub quantity: i64,
    pub reorder_point: Option<i64>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One signed quantity delta. Append-only; the source of truth for audits.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryLedgerEntry {
    pub id: String,
    pub tenant_id: String,
    pub location_id: String,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub delta: i64,
    pub reason: StockReason,
    /// Sale/refund/PO id this delta belongs to.
    pub correlation_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Loyalty
// =============================================================================

/// Tenant-level loyalty configuration.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyProgram {
    pub id: String,
    pub tenant_id: String,
    /// Cents of order discount per redeemed point.
    pub redeem_rate_cents_per_point: i64,
    /// Points earned per whole currency unit of eligible subtotal.
    pub points_per_currency_unit: i64,
    pub is_active: bool,
}

/// Point balance per (tenant, customer).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyAccount {
    pub id: String,
    pub tenant_id: String,
    pub customer_id: String,
    pub balance: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One earn/redeem/adjust event. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyLedgerEntry {
    pub id: String,
    pub account_id: String,
    pub kind: LoyaltyEventKind,
    /// Signed: positive for earn/restore, negative for redeem/revoke.
    pub points: i64,
    pub sale_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Register Sessions
// =============================================================================

/// A cash session on one register. The engine only needs "is it open" and
/// "how much cash is expected"; full session bookkeeping lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RegisterSession {
    pub id: String,
    pub tenant_id: String,
    pub register_id: String,
    pub status: SessionStatus,
    pub expected_cash_cents: i64,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_ref_prefers_variant() {
        let r = ItemRef::for_line(Some("prod-1"), Some("var-1")).unwrap();
        assert_eq!(r, ItemRef::variant("var-1"));

        let r = ItemRef::for_line(Some("prod-1"), None).unwrap();
        assert_eq!(r, ItemRef::product("prod-1"));

        assert!(ItemRef::for_line(None, None).is_none());
    }

    #[test]
    fn test_service_items_have_no_stock_identity() {
        let item = SaleItem {
            id: "i1".into(),
            sale_id: "s1".into(),
            product_id: Some("p1".into()),
            variant_id: None,
            sku: "SVC".into(),
            name: "Gift wrap".into(),
            quantity: 1,
            unit_price_cents: 300,
            line_discount_cents: 0,
            order_discount_cents: 0,
            tax_cents: 0,
            included_tax_cents: 0,
            total_cents: 300,
            tax_ids: vec![],
            is_service: true,
            is_kitchen: false,
            requires_id_check: false,
            min_age: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        assert!(item.item_ref().is_none());
    }

    #[test]
    fn test_discount_amount_off() {
        let percent = Discount {
            id: "d1".into(),
            tenant_id: "t1".into(),
            name: "10% off".into(),
            kind: DiscountKind::Percent,
            value: 1000,
            is_active: true,
        };
        assert_eq!(percent.amount_off(3500), 350);
        assert_eq!(percent.amount_off(5), 1); // 0.5 rounds up
        assert_eq!(percent.amount_off(0), 0);

        let fixed = Discount {
            id: "d2".into(),
            tenant_id: "t1".into(),
            name: "$2 off".into(),
            kind: DiscountKind::Fixed,
            value: 200,
            is_active: true,
        };
        assert_eq!(fixed.amount_off(1000), 200);
        // Capped at the eligible amount.
        assert_eq!(fixed.amount_off(150), 150);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SaleStatus::Draft.as_str(), "draft");
        assert_eq!(SaleStatus::Refunded.as_str(), "refunded");
    }
}
