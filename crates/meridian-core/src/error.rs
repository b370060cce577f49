//! # Error Types
//!
//! Domain error taxonomy for the POS engine.
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Every error carries the offending identifier so a client can render a
//!    specific message ("this coupon has expired", "only 3 left in stock")
//! 3. Errors are enum variants, never strings
//! 4. All validation happens before any mutation begins

use thiserror::Error;

// =============================================================================
// Coupon Rejection
// =============================================================================

/// The specific reason a coupon was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    /// No coupon with this code exists (or it is inactive).
    NotFound,
    /// The coupon's validity window has not opened yet.
    NotYetActive,
    /// The coupon's validity window has closed.
    Expired,
    /// The coupon has been used as many times as its limit allows.
    LimitReached,
}

impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            CouponRejection::NotFound => "not found",
            CouponRejection::NotYetActive => "not yet active",
            CouponRejection::Expired => "expired",
            CouponRejection::LimitReached => "usage limit reached",
        };
        f.write_str(reason)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations and domain logic failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed cart input, e.g. a line referencing neither product nor
    /// variant. Raised before any pricing aggregate is computed.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A referenced entity does not exist or is inactive. Inactive records
    /// are reported identically to missing ones.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The atomic conditional stock decrement failed.
    #[error("Insufficient stock for {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: i64,
        requested: i64,
    },

    /// Tendered payments do not cover the sale total.
    #[error("Insufficient payment: total {total_cents}, tendered {paid_cents}")]
    InsufficientPayment { total_cents: i64, paid_cents: i64 },

    /// A line requires age verification and the supplied ID record (if any)
    /// does not satisfy the minimum age.
    #[error("Age verification failed: minimum age {minimum_age}")]
    AgeVerificationFailed { minimum_age: i64 },

    /// Coupon validation failed, with the specific sub-reason.
    #[error("Coupon '{code}' invalid: {reason}")]
    CouponInvalid {
        code: String,
        reason: CouponRejection,
    },

    /// Loyalty redemption requested more points than the account holds.
    #[error("Insufficient loyalty points: requested {requested}, available {available}")]
    InsufficientPoints { requested: i64, available: i64 },

    /// Refund quantity exceeds the remaining refundable quantity on a line.
    #[error("Over-refund on item {sale_item_id}: {remaining} remaining, {requested} requested")]
    OverRefund {
        sale_item_id: String,
        remaining: i64,
        requested: i64,
    },

    /// Operation attempted against a sale not in the required status.
    #[error("Sale {sale_id} is {status}, cannot {operation}")]
    InvalidState {
        sale_id: String,
        status: String,
        operation: &'static str,
    },

    /// Input validation failure (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an InvalidInput error.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        CoreError::InvalidInput {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: &'static str },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
    },

    /// Invalid format (e.g. invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat {
        field: &'static str,
        reason: &'static str,
    },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_identifiers() {
        let err = CoreError::InsufficientStock {
            item_id: "variant-42".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for variant-42: available 3, requested 5"
        );

        let err = CoreError::CouponInvalid {
            code: "SUMMER10".to_string(),
            reason: CouponRejection::Expired,
        };
        assert_eq!(err.to_string(), "Coupon 'SUMMER10' invalid: expired");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::MustBePositive { field: "quantity" }.into();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
