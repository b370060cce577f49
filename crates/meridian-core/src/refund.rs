//! # Refund Planning
//!
//! Computes what a refund is worth before the storage layer commits it.
//! Amounts are prorated from each line's captured total by refunded
//! quantity, and the final units of a line always receive exactly the
//! cents that remain on it, so the sum of all refunds against a line can
//! never drift past what was paid.
//!
//! Over-refund protection is quantity-based: a request for more units than
//! remain unrefunded on a line is rejected outright, and the whole plan
//! fails with it.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::loyalty::{reversal_for_refund, LoyaltyReversal};
use crate::money::{round_div, RoundingMode};
use crate::types::{ItemRef, Sale, SaleItem, SaleStatus};

/// One line of a refund request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundLineRequest {
    pub sale_item_id: String,
    pub quantity: i64,
    /// Put the units back into stock. Ignored for service lines, which
    /// have no stock identity.
    pub restock: bool,
}

/// What has already been refunded against a sale item, across all prior
/// refunds of the sale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefundedTotals {
    pub quantity: i64,
    pub amount_cents: i64,
}

/// One planned refund line, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRefundLine {
    pub sale_item_id: String,
    pub quantity: i64,
    pub amount_cents: i64,
    pub restock: bool,
    /// Stock identity to restock, when `restock` is set and the line has one.
    pub item_ref: Option<ItemRef>,
}

/// A validated refund, with its loyalty reversal, ready for the storage
/// layer to apply in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPlan {
    pub lines: Vec<PlannedRefundLine>,
    pub total_cents: i64,
    /// True when this refund exhausts every line of the sale.
    pub fully_refunded: bool,
    pub loyalty: LoyaltyReversal,
}

/// Plans a refund against a completed sale.
///
/// `prior` maps sale item ids to their already-refunded totals; items with
/// no prior refunds may be absent. Fails with `InvalidState` unless the
/// sale is completed or refunded, `NotFound` for unknown item ids, and
/// `OverRefund` when a request exceeds a line's remaining quantity (on a
/// fully refunded sale every line has zero remaining, so that is the error
/// a further refund gets).
pub fn plan_refund(
    sale: &Sale,
    items: &[SaleItem],
    prior: &dyn Fn(&str) -> RefundedTotals,
    requests: &[RefundLineRequest],
) -> CoreResult<RefundPlan> {
    if !matches!(sale.status, SaleStatus::Completed | SaleStatus::Refunded) {
        return Err(CoreError::InvalidState {
            sale_id: sale.id.clone(),
            status: sale.status.as_str().to_string(),
            operation: "refund",
        });
    }

    if requests.is_empty() {
        return Err(CoreError::invalid_input("refund has no lines"));
    }

    let mut lines = Vec::with_capacity(requests.len());
    let mut total_cents = 0i64;
    // Remaining quantity per item after this plan, for the full-refund check.
    let mut remaining_after: Vec<(String, i64)> = items
        .iter()
        .map(|item| (item.id.clone(), item.quantity - prior(&item.id).quantity))
        .collect();

    for request in requests {
        if request.quantity <= 0 {
            return Err(CoreError::invalid_input("refund quantity must be positive"));
        }
        if requests
            .iter()
            .filter(|r| r.sale_item_id == request.sale_item_id)
            .count()
            > 1
        {
            return Err(CoreError::invalid_input(
                "refund references the same sale item twice",
            ));
        }

        let item = items
            .iter()
            .find(|item| item.id == request.sale_item_id)
            .ok_or_else(|| CoreError::not_found("SaleItem", &request.sale_item_id))?;

        let already = prior(&item.id);
        let remaining_qty = item.quantity - already.quantity;
        if request.quantity > remaining_qty {
            return Err(CoreError::OverRefund {
                sale_item_id: item.id.clone(),
                remaining: remaining_qty,
                requested: request.quantity,
            });
        }

        // Prorate by quantity; the last units get exactly the remaining
        // cents so repeated partial refunds sum to the line total.
        let amount_cents = if request.quantity == remaining_qty {
            item.total_cents - already.amount_cents
        } else {
            round_div(
                item.total_cents as i128 * request.quantity as i128,
                item.quantity as i128,
                RoundingMode::HalfUp,
            )
            .min(item.total_cents - already.amount_cents)
        };

        total_cents += amount_cents;

        if let Some(entry) = remaining_after.iter_mut().find(|(id, _)| *id == item.id) {
            entry.1 -= request.quantity;
        }

        lines.push(PlannedRefundLine {
            sale_item_id: item.id.clone(),
            quantity: request.quantity,
            amount_cents,
            restock: request.restock,
            item_ref: if request.restock { item.item_ref() } else { None },
        });
    }

    let fully_refunded = remaining_after.iter().all(|(_, qty)| *qty == 0);

    let loyalty = reversal_for_refund(
        sale.points_earned,
        sale.points_redeemed,
        total_cents,
        sale.total_cents,
    );

    Ok(RefundPlan {
        lines,
        total_cents,
        fully_refunded,
        loyalty,
    })
}
