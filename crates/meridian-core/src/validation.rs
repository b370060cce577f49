//! # Validation Module
//!
//! Input validation for cart and tender inputs. Runs before any business
//! logic or mutation; the database's NOT NULL / FK constraints are the last
//! line of defense behind it.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::ValidationError;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: positive and within the per-line cap.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive { field: "quantity" });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity",
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price or discount override in cents. Zero is allowed (free
/// items, no discount); negatives are not.
pub fn validate_cents(field: &'static str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field,
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a tendered payment amount: strictly positive.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount",
        });
    }

    Ok(())
}

/// Validates the number of cart lines.
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required { field: "lines" });
    }

    if lines > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines",
            min: 1,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a UUID string format.
pub fn validate_uuid(field: &'static str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field,
        reason: "must be a valid UUID",
    })?;

    Ok(())
}

// =============================================================================
// Age Verification
// =============================================================================

/// Computes a purchaser's age in whole years at `now` given the birth date
/// from their ID document.
pub fn age_in_years(birth_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let today = now.date_naive();
    let mut age = i64::from(today.year() - birth_date.year());

    // Not yet had the birthday this year.
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }

    age.max(0)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_cents() {
        assert!(validate_cents("price", 0).is_ok());
        assert!(validate_cents("price", 1099).is_ok());
        assert!(validate_cents("price", -1).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES).is_ok());
        assert!(validate_cart_size(0).is_err());
        assert!(validate_cart_size(MAX_CART_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
    }

    #[test]
    fn test_age_in_years() {
        let now = Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap();

        // Birthday already passed this year.
        let birth = NaiveDate::from_ymd_opt(2005, 3, 1).unwrap();
        assert_eq!(age_in_years(birth, now), 21);

        // Birthday later this year: still one year younger.
        let birth = NaiveDate::from_ymd_opt(2005, 9, 1).unwrap();
        assert_eq!(age_in_years(birth, now), 20);

        // Birthday exactly today counts.
        let birth = NaiveDate::from_ymd_opt(2008, 6, 15).unwrap();
        assert_eq!(age_in_years(birth, now), 18);
    }
}
