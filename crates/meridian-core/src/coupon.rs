//! # Coupon Validation
//!
//! Pure coupon checks: active, inside the validity window, under the usage
//! limit. Each violated condition reports its specific reason so the client
//! can say *why* ("this coupon has expired", not "invalid coupon").
//!
//! The usage counter itself is bumped atomically by the storage layer at
//! finalize time - never here, never at draft/pricing time.

use chrono::{DateTime, Utc};

use crate::error::CouponRejection;
use crate::types::Coupon;

/// Validates a coupon against the clock and its own counters.
///
/// Inactive coupons are reported as `NotFound`, matching the catalog's
/// uniform treatment of inactive records.
pub fn validate_coupon(coupon: &Coupon, now: DateTime<Utc>) -> Result<(), CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::NotFound);
    }

    if let Some(starts_at) = coupon.starts_at {
        if now < starts_at {
            return Err(CouponRejection::NotYetActive);
        }
    }

    if let Some(ends_at) = coupon.ends_at {
        if now > ends_at {
            return Err(CouponRejection::Expired);
        }
    }

    if let Some(limit) = coupon.usage_limit {
        if coupon.usage_count >= limit {
            return Err(CouponRejection::LimitReached);
        }
    }

    Ok(())
}
