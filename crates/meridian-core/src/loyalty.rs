//! # Loyalty Math
//!
//! Point redemption, earning and refund reversal. Pure arithmetic; the
//! balance mutation and ledger appends live in the storage layer and happen
//! only at finalize/refund commit time.
//!
//! - Redemption folds `points * redeem_rate_cents_per_point` into the
//!   order-level discount before line allocation.
//! - Earning is computed at finalize on the post-discount (pre-tax) eligible
//!   subtotal, floored: you never earn a fraction of a point.
//! - Refund reversal revokes earned points and restores redeemed points
//!   proportionally to the refunded fraction of the sale total, each rounded
//!   independently (half-up).

use crate::error::{CoreError, CoreResult};
use crate::money::{round_div, RoundingMode};
use crate::types::LoyaltyProgram;

/// Cents of order discount bought by redeeming `points`.
pub fn redemption_cents(program: &LoyaltyProgram, points: i64) -> i64 {
    points * program.redeem_rate_cents_per_point
}

/// Points earned on an eligible (post-discount, pre-tax) subtotal.
pub fn points_earned(program: &LoyaltyProgram, eligible_cents: i64) -> i64 {
    if eligible_cents <= 0 {
        return 0;
    }
    // Floor division: partial currency units earn nothing.
    eligible_cents * program.points_per_currency_unit / 100
}

/// Checks an account balance can cover a redemption request.
pub fn validate_redemption(available: i64, requested: i64) -> CoreResult<()> {
    if requested > available {
        return Err(CoreError::InsufficientPoints {
            requested,
            available,
        });
    }
    Ok(())
}

/// Point adjustments produced by a (partial) refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoyaltyReversal {
    /// Earned points taken back from the account.
    pub revoked: i64,
    /// Redeemed points given back to the account.
    pub restored: i64,
}

/// Reverses loyalty effects proportionally to the refunded fraction of the
/// sale total. Each figure is rounded independently.
pub fn reversal_for_refund(
    points_earned: i64,
    points_redeemed: i64,
    refund_cents: i64,
    sale_total_cents: i64,
) -> LoyaltyReversal {
    if sale_total_cents <= 0 || refund_cents <= 0 {
        return LoyaltyReversal {
            revoked: 0,
            restored: 0,
        };
    }

    let prorate = |points: i64| -> i64 {
        round_div(
            points as i128 * refund_cents as i128,
            sale_total_cents as i128,
            RoundingMode::HalfUp,
        )
        .min(points)
    };

    LoyaltyReversal {
        revoked: prorate(points_earned),
        restored: prorate(points_redeemed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> LoyaltyProgram {
        LoyaltyProgram {
            id: "lp1".into(),
            tenant_id: "t1".into(),
            redeem_rate_cents_per_point: 5,
            points_per_currency_unit: 1,
            is_active: true,
        }
    }

    #[test]
    fn test_redemption_cents() {
        assert_eq!(redemption_cents(&program(), 100), 500);
        assert_eq!(redemption_cents(&program(), 0), 0);
    }

    #[test]
    fn test_points_earned_floors() {
        let p = program();
        assert_eq!(points_earned(&p, 1000), 10); // $10.00 -> 10 points
        assert_eq!(points_earned(&p, 1099), 10); // partial dollar earns nothing
        assert_eq!(points_earned(&p, 99), 0);
        assert_eq!(points_earned(&p, 0), 0);
        assert_eq!(points_earned(&p, -500), 0);
    }

    #[test]
    fn test_validate_redemption() {
        assert!(validate_redemption(100, 100).is_ok());
        let err = validate_redemption(50, 100).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientPoints {
                requested: 100,
                available: 50
            }
        ));
    }

    #[test]
    fn test_reversal_is_proportional() {
        // Half the sale refunded: half the points, each rounded on its own.
        let r = reversal_for_refund(10, 25, 500, 1000);
        assert_eq!(r, LoyaltyReversal { revoked: 5, restored: 13 }); // 12.5 -> 13

        // Full refund reverses everything.
        let r = reversal_for_refund(10, 25, 1000, 1000);
        assert_eq!(r, LoyaltyReversal { revoked: 10, restored: 25 });
    }

    #[test]
    fn test_reversal_never_exceeds_original() {
        // Rounding can not push the reversal past the original points.
        let r = reversal_for_refund(1, 1, 999, 1000);
        assert!(r.revoked <= 1 && r.restored <= 1);

        let r = reversal_for_refund(0, 0, 500, 1000);
        assert_eq!(r, LoyaltyReversal { revoked: 0, restored: 0 });
    }
}
