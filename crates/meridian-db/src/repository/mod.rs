//! # Repository Module
//!
//! Database repository implementations for Meridian POS.
//!
//! Each repository wraps the shared [`sqlx::SqlitePool`] and exposes the
//! queries for one slice of the schema. SQL never appears outside this
//! module.
//!
//! Operations that must be atomic with others (stock decrements at
//! finalize, coupon counters, status flips) come in `*_tx` variants taking
//! a `&mut SqliteConnection`, so the service layer can compose them inside
//! one transaction. The plain variants acquire from the pool and are for
//! standalone use.
//!
//! ## Available Repositories
//!
//! - [`catalog::CatalogRepository`] - products, variants, taxes, discounts, coupons
//! - [`inventory::InventoryRepository`] - stock on hand and the movement ledger
//! - [`sale::SaleRepository`] - sales, sale items, payments, receipts
//! - [`refund::RefundRepository`] - refunds and refund items
//! - [`loyalty::LoyaltyRepository`] - programs, accounts, points ledger
//! - [`session::SessionRepository`] - register sessions and cash tracking
//! - [`audit::AuditRepository`] - append-only audit trail

pub mod audit;
pub mod catalog;
pub mod inventory;
pub mod loyalty;
pub mod refund;
pub mod sale;
pub mod session;
