//! # meridian-core: Pure Business Logic for Meridian POS
//!
//! This crate is the **heart** of Meridian POS. It contains all pricing,
//! lifecycle and settlement logic as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Meridian POS Architecture                    │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                 Callers (register apps, APIs)              │ │
//! │  └────────────────────────────┬───────────────────────────────┘ │
//! │                               │                                  │
//! │  ┌────────────────────────────▼───────────────────────────────┐ │
//! │  │               meridian-db (storage + service)              │ │
//! │  │     SQLite repositories, transactions, PosService          │ │
//! │  └────────────────────────────┬───────────────────────────────┘ │
//! │                               │                                  │
//! │  ┌────────────────────────────▼───────────────────────────────┐ │
//! │  │             ★ meridian-core (THIS CRATE) ★                 │ │
//! │  │                                                            │ │
//! │  │   pricing ── money ── coupon ── loyalty ── refund          │ │
//! │  │   types ── catalog ── receipt ── validation ── error       │ │
//! │  │                                                            │ │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS         │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, Refund, etc.)
//! - [`money`] - Integer-cent arithmetic and the exact allocator
//! - [`pricing`] - The cart pricing engine
//! - [`coupon`] / [`loyalty`] - Promotion and points math
//! - [`refund`] - Refund planning with over-refund protection
//! - [`receipt`] - Immutable receipt documents
//! - [`catalog`] - The read-only lookup trait pricing runs against
//! - [`validation`] / [`error`] - Input rules and the error taxonomy
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output; the clock is an argument
//! 2. **No I/O**: database, network and file system access are forbidden here
//! 3. **Integer Money**: all monetary values are cents (i64), never floats
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use meridian_core::money::{allocate_proportionally, percent_of, RoundingMode};
//!
//! // Split a $3.50 order discount across a $20.00 and a $15.00 line.
//! let shares = allocate_proportionally(350, &[2000, 1500]);
//! assert_eq!(shares, vec![200, 150]);
//!
//! // 8% tax on the discounted first line.
//! assert_eq!(percent_of(1800, 800, RoundingMode::HalfUp), 144);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod config;
pub mod coupon;
pub mod error;
pub mod loyalty;
pub mod money;
pub mod pricing;
pub mod receipt;
pub mod refund;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::{Catalog, CatalogSnapshot};
pub use config::PosConfig;
pub use error::{CoreError, CoreResult, CouponRejection, ValidationError};
pub use money::{Money, RoundingMode};
pub use pricing::{CartInput, CartLineInput, PricedCart, PricedLine, PricingContext};
pub use receipt::ReceiptDocument;
pub use refund::{plan_refund, RefundLineRequest, RefundPlan, RefundedTotals};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tenant ID for single-tenant deployments. The schema carries
/// tenant_id on every table so multi-tenant runtimes only swap this for
/// per-request resolution.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line. Catches fat-fingered quantities
/// (1000 typed instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;
