//! # Money Module
//!
//! Integer-cent money arithmetic for the POS engine.
//!
//! ## Why Integer Money?
//! ```text
//! In floating point:  0.1 + 0.2 = 0.30000000000000004   WRONG
//! In integer cents:   10 + 20 = 30                      exact
//! ```
//! Every monetary value in the system is an `i64` number of cents. Rates
//! (taxes, percent discounts) are integer basis points (1 bps = 0.01%), so
//! no calculation ever touches a float.
//!
//! ## Rounding
//! Percent math cannot always land on a whole cent. Two rounding modes are
//! supported: half-up (the POS default) and half-even (bankers rounding).
//! The order-discount allocator goes one step further: after rounding each
//! line's proportional share it redistributes the leftover cents so the
//! allocated sum equals the order discount *exactly*.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

/// Denominator for basis-point rates: 10000 bps = 100%.
pub const BPS_DENOMINATOR: i64 = 10_000;

// =============================================================================
// Rounding
// =============================================================================

/// How fractional cents are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Round 0.5 away from zero. The POS default.
    HalfUp,
    /// Round 0.5 to the nearest even cent (bankers rounding).
    HalfEven,
}

impl Default for RoundingMode {
    fn default() -> Self {
        RoundingMode::HalfUp
    }
}

/// Divides `numer / denom` and rounds the result to a whole number of cents.
///
/// Both operands must be non-negative and `denom` must be positive; every
/// caller in this crate guarantees that (amounts are validated non-negative
/// before any math runs).
pub fn round_div(numer: i128, denom: i128, mode: RoundingMode) -> i64 {
    debug_assert!(denom > 0);
    debug_assert!(numer >= 0);

    let quotient = numer / denom;
    let remainder = numer - quotient * denom;

    let rounded = match mode {
        RoundingMode::HalfUp => {
            if remainder * 2 >= denom {
                quotient + 1
            } else {
                quotient
            }
        }
        RoundingMode::HalfEven => {
            let doubled = remainder * 2;
            if doubled > denom || (doubled == denom && quotient % 2 != 0) {
                quotient + 1
            } else {
                quotient
            }
        }
    };

    rounded as i64
}

/// Computes `amount * bps / 10000`, rounded.
///
/// Used for percent discounts and exclusive tax additions.
pub fn percent_of(amount_cents: i64, bps: u32, mode: RoundingMode) -> i64 {
    round_div(
        amount_cents as i128 * bps as i128,
        BPS_DENOMINATOR as i128,
        mode,
    )
}

/// Extracts the tax portion already embedded in a tax-inclusive amount.
///
/// `round(amount * rate / (1 + rate))` expressed in basis points:
/// `amount * bps / (10000 + bps)`. The amount itself does not change; this
/// only reports how much of it is tax.
pub fn inclusive_tax_part(amount_cents: i64, bps: u32, mode: RoundingMode) -> i64 {
    round_div(
        amount_cents as i128 * bps as i128,
        (BPS_DENOMINATOR + bps as i64) as i128,
        mode,
    )
}

// =============================================================================
// Proportional Allocation
// =============================================================================

/// Distributes `amount` across lines proportionally to `bases`, in whole
/// cents, such that the returned shares sum to `amount` **exactly** and no
/// share exceeds its base.
///
/// ## Algorithm
/// 1. Each line's exact share is `base[i] * amount / sum(bases)`; it is
///    rounded half-up to a whole cent.
/// 2. Rounding leaves a remainder of a few cents (positive or negative).
///    Shares are nudged by one cent at a time, largest fractional error
///    first, lowest line index on ties, until the sum matches `amount`.
///
/// ## Preconditions
/// `amount >= 0`, every base `>= 0`, and `amount <= sum(bases)`. Callers
/// (the pricing engine) cap the order discount at the eligible sum before
/// allocating.
///
/// ## Example
/// ```rust
/// use meridian_core::money::allocate_proportionally;
///
/// // 350 cents across bases 2000/1500 splits 200/150 with no remainder.
/// assert_eq!(allocate_proportionally(350, &[2000, 1500]), vec![200, 150]);
///
/// // 100 cents across three equal bases cannot split evenly; the extra
/// // cent goes to the earliest largest-remainder line.
/// assert_eq!(allocate_proportionally(100, &[100, 100, 100]), vec![34, 33, 33]);
/// ```
pub fn allocate_proportionally(amount: i64, bases: &[i64]) -> Vec<i64> {
    debug_assert!(amount >= 0);
    debug_assert!(bases.iter().all(|b| *b >= 0));

    let sum: i128 = bases.iter().map(|b| *b as i128).sum();
    if amount == 0 || sum == 0 || bases.is_empty() {
        return vec![0; bases.len()];
    }
    debug_assert!(amount as i128 <= sum);

    // Round each exact share half-up, remembering the signed rounding error
    // (share * sum - exact_numerator): positive means the line was rounded
    // up, negative means rounded down.
    let mut shares = Vec::with_capacity(bases.len());
    let mut errors = Vec::with_capacity(bases.len());
    for base in bases {
        let exact = *base as i128 * amount as i128;
        let share = round_div(exact, sum, RoundingMode::HalfUp);
        shares.push(share);
        errors.push(share as i128 * sum - exact);
    }

    let mut diff = amount - shares.iter().sum::<i64>();

    // Redistribute the leftover cents. Each full pass over the candidates
    // moves at least one cent while `diff != 0` (feasible because
    // 0 <= share <= base and amount <= sum), so this terminates.
    while diff != 0 {
        let mut order: Vec<usize> = (0..bases.len()).collect();
        if diff > 0 {
            // Most under-allocated first (most negative error), then index.
            order.sort_by(|&a, &b| errors[a].cmp(&errors[b]).then(a.cmp(&b)));
            for i in order {
                if diff == 0 {
                    break;
                }
                if shares[i] < bases[i] {
                    shares[i] += 1;
                    errors[i] += sum;
                    diff -= 1;
                }
            }
        } else {
            // Most over-allocated first (most positive error), then index.
            order.sort_by(|&a, &b| errors[b].cmp(&errors[a]).then(a.cmp(&b)));
            for i in order {
                if diff == 0 {
                    break;
                }
                if shares[i] > 0 {
                    shares[i] -= 1;
                    errors[i] -= sum;
                    diff += 1;
                }
            }
        }
    }

    shares
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so refunds and discounts can be represented as negative values.
/// Domain structs store raw `i64` cents for storage friendliness; `Money`
/// is the arithmetic and display helper wrapped around them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }
}

/// Human-readable format for receipts and logs. Frontend localization owns
/// the real display formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
