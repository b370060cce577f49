//! # meridian-db: Storage Layer for Meridian POS
//!
//! SQLite persistence and transaction orchestration for Meridian POS.
//!
//! ## Architecture Position
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Meridian POS Data Flow                       │
//! │                                                                  │
//! │  Caller (register app / API)                                     │
//! │       │                                                          │
//! │       ▼                                                          │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                 meridian-db (THIS CRATE)                   │ │
//! │  │                                                            │ │
//! │  │   ┌────────────┐  ┌──────────────┐  ┌──────────────────┐  │ │
//! │  │   │ PosService │  │ Repositories │  │    Migrations    │  │ │
//! │  │   │(service.rs)│  │ (repository/)│  │    (embedded)    │  │ │
//! │  │   │            │  │              │  │                  │  │ │
//! │  │   │ pricing    │─►│ catalog      │  │ 001_initial_     │  │ │
//! │  │   │ finalize   │  │ inventory    │  │   schema.sql     │  │ │
//! │  │   │ refund     │  │ sale refund  │  │                  │  │ │
//! │  │   │            │  │ loyalty ...  │  │                  │  │ │
//! │  │   └────────────┘  └──────────────┘  └──────────────────┘  │ │
//! │  └────────────────────────────┬───────────────────────────────┘ │
//! │                               ▼                                  │
//! │                     SQLite database (WAL)                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations per schema slice
//! - [`service`] - PosService: pricing, finalize, refund orchestration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_db::{Database, DbConfig, PosService};
//! use meridian_core::PosConfig;
//!
//! let db = Database::new(DbConfig::new("pos.db")).await?;
//! let service = PosService::new(db, PosConfig::default());
//!
//! let sale = service.create_draft_sale(request).await?;
//! let finalized = service.finalize_sale(&sale.id, &tenders, None).await?;
//! println!("receipt {}", finalized.receipt.receipt_number);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use service::{
    CreateDraftSale, FinalizedSale, IdVerification, PosService, RefundRequest, ServiceError,
    ServiceResult, TenderInput,
};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::inventory::{InventoryRepository, StockApply};
pub use repository::loyalty::LoyaltyRepository;
pub use repository::refund::RefundRepository;
pub use repository::sale::SaleRepository;
pub use repository::session::SessionRepository;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Location used for stock movements when a sale carries no explicit
/// location (single-store deployments).
pub const DEFAULT_LOCATION_ID: &str = "default";
