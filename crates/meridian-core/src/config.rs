//! # Engine Configuration
//!
//! Explicit configuration passed into the pricing and finalize entry points.
//! There is no ambient global state: callers construct a [`PosConfig`] and
//! hand it to the service.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::RoundingMode;

/// Tunable policy for the pricing and settlement engine.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PosConfig {
    /// How tax math resolves fractional cents. Discount allocation always
    /// rounds half-up regardless (the allocator's exactness contract depends
    /// on it).
    pub tax_rounding: RoundingMode,

    /// Maximum number of tenders accepted in one finalize call.
    pub max_split_tenders: usize,

    /// When false, loyalty redemption and earning are disabled entirely.
    pub loyalty_enabled: bool,
}

impl Default for PosConfig {
    fn default() -> Self {
        PosConfig {
            tax_rounding: RoundingMode::HalfUp,
            max_split_tenders: 4,
            loyalty_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PosConfig::default();
        assert_eq!(cfg.tax_rounding, RoundingMode::HalfUp);
        assert_eq!(cfg.max_split_tenders, 4);
        assert!(cfg.loyalty_enabled);
    }
}
