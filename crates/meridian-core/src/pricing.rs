//! # Pricing Engine
//!
//! Turns a cart into priced line items, taxes and totals. Pure and
//! deterministic: identical inputs always yield identical cents, and no
//! partial result is ever returned - every referenced record is resolved
//! before the first aggregate is computed.
//!
//! ## Pipeline
//! ```text
//! resolve lines (price, sku/name snapshot, taxes)
//!      |
//! per-line discounts (override > referenced Discount > none)
//!      |
//! order-level discount = explicit + coupon + loyalty redemption
//!      |
//! proportional allocation across lines (exact to the cent)
//!      |
//! taxes per line: inclusive extracted, exclusive added
//!      |
//! aggregates: subtotal / discount / tax / total
//! ```
//!
//! ## Invariants
//! - `sum(line order_discount) == order discount` exactly
//! - `total == subtotal - discount + tax + shipping`
//! - `total == sum(line totals) + shipping`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::catalog::Catalog;
use crate::config::PosConfig;
use crate::coupon::validate_coupon;
use crate::error::{CoreError, CoreResult};
use crate::loyalty;
use crate::money::{allocate_proportionally, inclusive_tax_part, percent_of};
use crate::types::{Coupon, Discount, LoyaltyProgram, Tax};
use crate::validation::{validate_cart_size, validate_cents, validate_quantity};

// =============================================================================
// Input Types
// =============================================================================

/// One cart line as submitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLineInput {
    /// Product reference; required unless `variant_id` is set.
    pub product_id: Option<String>,
    /// Variant reference; wins over `product_id` for price and identity.
    pub variant_id: Option<String>,
    pub quantity: i64,
    /// Explicit price override in cents (e.g. open-price items).
    pub unit_price_cents: Option<i64>,
    /// Explicit line discount in cents; wins over `discount_id`.
    pub discount_cents: Option<i64>,
    /// Referenced Discount record to compute the line discount from.
    pub discount_id: Option<String>,
}

/// A whole cart as submitted by the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartInput {
    pub lines: Vec<CartLineInput>,
    /// Explicit order-level discount in cents.
    pub order_discount_cents: Option<i64>,
    pub coupon_code: Option<String>,
    pub points_to_redeem: Option<i64>,
    pub shipping_cents: Option<i64>,
}

/// Pre-resolved, read-only context the storage layer hands to the engine so
/// pricing itself performs no lookups beyond the catalog snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    /// The coupon named by `CartInput::coupon_code`, with its discount,
    /// if such a coupon exists.
    pub coupon: Option<(&'a Coupon, &'a Discount)>,
    /// The tenant's active loyalty program, if any.
    pub loyalty_program: Option<&'a LoyaltyProgram>,
    /// The pricing instant (coupon windows are checked against it).
    pub now: DateTime<Utc>,
}

// =============================================================================
// Output Types
// =============================================================================

/// One fully priced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedLine {
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_discount_cents: i64,
    /// This line's exact slice of the order-level discount.
    pub order_discount_cents: i64,
    /// Exclusive tax added on top.
    pub tax_cents: i64,
    /// Inclusive tax extracted, not added.
    pub included_tax_cents: i64,
    pub total_cents: i64,
    pub tax_ids: Vec<String>,
    pub is_service: bool,
    pub is_kitchen: bool,
    pub requires_id_check: bool,
    pub min_age: Option<i64>,
}

/// A fully priced cart. The draft Sale and its items are persisted straight
/// from this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub subtotal_cents: i64,
    /// Line discounts plus the allocated order-level discount.
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub included_tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
    /// Total units across all lines.
    pub item_count: i64,
    pub coupon_code: Option<String>,
    /// The coupon's share of the order-level discount.
    pub coupon_cents: i64,
    pub points_redeemed: i64,
    /// The redemption's share of the order-level discount.
    pub redemption_cents: i64,
}

/// Intermediate resolution of one line, before discounts and taxes.
struct ResolvedLine {
    product_id: Option<String>,
    variant_id: Option<String>,
    sku: String,
    name: String,
    quantity: i64,
    unit_price_cents: i64,
    base_cents: i64,
    line_discount_cents: i64,
    taxes: Vec<Tax>,
    is_service: bool,
    is_kitchen: bool,
    requires_id_check: bool,
    min_age: Option<i64>,
}

// =============================================================================
// Engine
// =============================================================================

/// Prices a cart. See the module docs for the pipeline.
///
/// Fails with `NotFound`/`InvalidInput`/`CouponInvalid`/`InsufficientPoints`
/// before any aggregate is computed; no partial pricing is ever returned.
pub fn price_cart(
    catalog: &dyn Catalog,
    config: &PosConfig,
    input: &CartInput,
    ctx: &PricingContext<'_>,
) -> CoreResult<PricedCart> {
    validate_cart_size(input.lines.len())?;

    // Phase 1: resolve every referenced record. Any miss aborts here.
    let mut resolved = Vec::with_capacity(input.lines.len());
    for line in &input.lines {
        resolved.push(resolve_line(catalog, line)?);
    }

    // Phase 2: order-level discount components against the sum of
    // post-line-discount, pre-tax amounts.
    let bases: Vec<i64> = resolved
        .iter()
        .map(|l| l.base_cents - l.line_discount_cents)
        .collect();
    let eligible_cents: i64 = bases.iter().sum();

    let explicit_cents = input.order_discount_cents.unwrap_or(0);
    validate_cents("order discount", explicit_cents)?;

    let coupon_cents = resolve_coupon_cents(input, ctx, eligible_cents)?;
    let (points_redeemed, redemption_cents) =
        resolve_redemption_cents(config, input, ctx)?;

    let order_discount = (explicit_cents + coupon_cents + redemption_cents).min(eligible_cents);

    // Phase 3: exact-cent allocation, then taxes per line.
    let allocations = allocate_proportionally(order_discount, &bases);

    let shipping_cents = input.shipping_cents.unwrap_or(0);
    validate_cents("shipping", shipping_cents)?;

    let mut lines = Vec::with_capacity(resolved.len());
    let mut subtotal = 0i64;
    let mut discount_total = 0i64;
    let mut tax_total = 0i64;
    let mut included_tax_total = 0i64;
    let mut grand_total = 0i64;
    let mut item_count = 0i64;

    for (line, allocation) in resolved.into_iter().zip(allocations) {
        let taxable =
            (line.base_cents - line.line_discount_cents - allocation).max(0);

        let mut tax_cents = 0i64;
        let mut included_tax_cents = 0i64;
        for tax in &line.taxes {
            if tax.inclusive {
                included_tax_cents +=
                    inclusive_tax_part(taxable, tax.rate_bps, config.tax_rounding);
            } else {
                tax_cents += percent_of(taxable, tax.rate_bps, config.tax_rounding);
            }
        }

        let total_cents = taxable + tax_cents;

        subtotal += line.base_cents;
        discount_total += line.line_discount_cents + allocation;
        tax_total += tax_cents;
        included_tax_total += included_tax_cents;
        grand_total += total_cents;
        item_count += line.quantity;

        lines.push(PricedLine {
            product_id: line.product_id,
            variant_id: line.variant_id,
            sku: line.sku,
            name: line.name,
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            line_discount_cents: line.line_discount_cents,
            order_discount_cents: allocation,
            tax_cents,
            included_tax_cents,
            total_cents,
            tax_ids: line.taxes.iter().map(|t| t.id.clone()).collect(),
            is_service: line.is_service,
            is_kitchen: line.is_kitchen,
            requires_id_check: line.requires_id_check,
            min_age: line.min_age,
        });
    }

    Ok(PricedCart {
        lines,
        subtotal_cents: subtotal,
        discount_cents: discount_total,
        tax_cents: tax_total,
        included_tax_cents: included_tax_total,
        shipping_cents,
        total_cents: grand_total + shipping_cents,
        item_count,
        coupon_code: input.coupon_code.clone(),
        coupon_cents,
        points_redeemed,
        redemption_cents,
    })
}

/// Resolves one line: identity, active price, snapshot fields, line
/// discount and attached taxes.
fn resolve_line(catalog: &dyn Catalog, line: &CartLineInput) -> CoreResult<ResolvedLine> {
    validate_quantity(line.quantity)?;
    if let Some(price) = line.unit_price_cents {
        validate_cents("unit price", price)?;
    }
    if let Some(discount) = line.discount_cents {
        validate_cents("line discount", discount)?;
    }

    // Identity: variant wins; a line referencing neither is malformed.
    let (product, variant) = match (&line.variant_id, &line.product_id) {
        (Some(variant_id), _) => {
            let variant = catalog
                .variant(variant_id)
                .ok_or_else(|| CoreError::not_found("Variant", variant_id))?;
            let product = catalog
                .product(&variant.product_id)
                .ok_or_else(|| CoreError::not_found("Product", &variant.product_id))?;
            (product, Some(variant))
        }
        (None, Some(product_id)) => {
            let product = catalog
                .product(product_id)
                .ok_or_else(|| CoreError::not_found("Product", product_id))?;
            (product, None)
        }
        (None, None) => {
            return Err(CoreError::invalid_input(
                "cart line references neither product nor variant",
            ));
        }
    };

    // Active price: override > variant price > product base price.
    let unit_price_cents = line
        .unit_price_cents
        .or_else(|| variant.and_then(|v| v.price_cents))
        .unwrap_or(product.price_cents);

    let base_cents = unit_price_cents * line.quantity;

    // Line discount: explicit override > referenced Discount > none.
    // Capped at the base amount either way.
    let line_discount_cents = if let Some(cents) = line.discount_cents {
        cents.min(base_cents)
    } else if let Some(discount_id) = &line.discount_id {
        let discount = catalog
            .discount(discount_id)
            .ok_or_else(|| CoreError::not_found("Discount", discount_id))?;
        discount.amount_off(base_cents)
    } else {
        0
    };

    // Taxes resolve now so a dangling tax id fails the whole cart before
    // any aggregate exists.
    let mut taxes = Vec::with_capacity(product.tax_ids.len());
    for tax_id in &product.tax_ids {
        let tax = catalog
            .tax(tax_id)
            .ok_or_else(|| CoreError::not_found("Tax", tax_id))?;
        taxes.push(tax.clone());
    }

    let (sku, name) = match variant {
        Some(v) => (v.sku.clone(), v.name.clone()),
        None => (product.sku.clone(), product.name.clone()),
    };

    Ok(ResolvedLine {
        product_id: Some(product.id.clone()),
        variant_id: variant.map(|v| v.id.clone()),
        sku,
        name,
        quantity: line.quantity,
        unit_price_cents,
        base_cents,
        line_discount_cents,
        taxes,
        is_service: product.is_service,
        is_kitchen: product.is_kitchen,
        requires_id_check: product.requires_id_check,
        min_age: product.min_age,
    })
}

/// Coupon component of the order-level discount.
fn resolve_coupon_cents(
    input: &CartInput,
    ctx: &PricingContext<'_>,
    eligible_cents: i64,
) -> CoreResult<i64> {
    let Some(code) = &input.coupon_code else {
        return Ok(0);
    };

    let Some((coupon, discount)) = ctx.coupon else {
        return Err(CoreError::CouponInvalid {
            code: code.clone(),
            reason: crate::error::CouponRejection::NotFound,
        });
    };

    validate_coupon(coupon, ctx.now).map_err(|reason| CoreError::CouponInvalid {
        code: code.clone(),
        reason,
    })?;

    Ok(discount.amount_off(eligible_cents))
}

/// Loyalty-redemption component of the order-level discount. Balance
/// sufficiency is enforced by the storage layer at commit; here the request
/// only has to be well-formed and priced.
fn resolve_redemption_cents(
    config: &PosConfig,
    input: &CartInput,
    ctx: &PricingContext<'_>,
) -> CoreResult<(i64, i64)> {
    let points = input.points_to_redeem.unwrap_or(0);
    if points == 0 {
        return Ok((0, 0));
    }
    validate_cents("points to redeem", points)?;

    if !config.loyalty_enabled {
        return Err(CoreError::invalid_input(
            "loyalty redemption is disabled for this tenant",
        ));
    }

    let Some(program) = ctx.loyalty_program else {
        return Err(CoreError::invalid_input(
            "no active loyalty program for this tenant",
        ));
    };

    Ok((points, loyalty::redemption_cents(program, points)))
}

// =============================================================================
// Unit Tests
// =============================================================================
