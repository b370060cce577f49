//! # Sale Repository
//!
//! Database operations for sales, sale items, payments and receipts.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                         │
//! │                                                              │
//! │  1. CREATE DRAFT                                             │
//! │     └── insert_draft() → Sale { status: Draft } + items      │
//! │                                                              │
//! │  2. REPRICE (any number of times)                            │
//! │     └── replace_draft_tx() → new totals + new items          │
//! │                                                              │
//! │  3a. FINALIZE                                                │
//! │     └── mark_completed_tx() → guarded status flip            │
//! │     └── payments + receipt inserted in the same transaction  │
//! │                                                              │
//! │  3b. VOID (drafts only)                                      │
//! │     └── mark_voided() → Sale { status: Voided }              │
//! │                                                              │
//! │  4. REFUND (completed only, via RefundRepository)            │
//! │     └── mark_refunded_tx() when fully refunded               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status flips are guarded UPDATEs (`WHERE status = ...`), so of N
//! concurrent finalize attempts exactly one wins; the rest see zero rows
//! affected and abort.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{Payment, Sale, SaleItem};

/// A stored receipt row: the immutable document plus its metadata.
#[derive(Debug, Clone)]
pub struct StoredReceipt {
    pub sale_id: String,
    pub receipt_number: String,
    pub document: String,
    pub issued_at: DateTime<Utc>,
}

/// Maps a sale item row, decoding the `tax_ids` JSON snapshot column.
pub(crate) fn sale_item_from_row(row: &SqliteRow) -> DbResult<SaleItem> {
    let tax_ids_json: String = row.try_get("tax_ids")?;
    let tax_ids: Vec<String> = serde_json::from_str(&tax_ids_json)
        .map_err(|e| DbError::corrupt("sale_items", e.to_string()))?;

    Ok(SaleItem {
        id: row.try_get("id")?,
        sale_id: row.try_get("sale_id")?,
        product_id: row.try_get("product_id")?,
        variant_id: row.try_get("variant_id")?,
        sku: row.try_get("sku")?,
        name: row.try_get("name")?,
        quantity: row.try_get("quantity")?,
        unit_price_cents: row.try_get("unit_price_cents")?,
        line_discount_cents: row.try_get("line_discount_cents")?,
        order_discount_cents: row.try_get("order_discount_cents")?,
        tax_cents: row.try_get("tax_cents")?,
        included_tax_cents: row.try_get("included_tax_cents")?,
        total_cents: row.try_get("total_cents")?,
        tax_ids,
        is_service: row.try_get("is_service")?,
        is_kitchen: row.try_get("is_kitchen")?,
        requires_id_check: row.try_get("requires_id_check")?,
        min_age: row.try_get("min_age")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets a sale's items in insertion order.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let rows = sqlx::query("SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY rowid")
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(sale_item_from_row).collect()
    }

    /// Gets a sale's payments in capture order.
    pub async fn get_payments(&self, sale_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE sale_id = ?1 ORDER BY rowid",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Gets the stored receipt for a sale, if it has been finalized.
    pub async fn get_receipt(&self, sale_id: &str) -> DbResult<Option<StoredReceipt>> {
        let row = sqlx::query("SELECT * FROM receipts WHERE sale_id = ?1")
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(StoredReceipt {
                sale_id: row.try_get("sale_id")?,
                receipt_number: row.try_get("receipt_number")?,
                document: row.try_get("document")?,
                issued_at: row.try_get("issued_at")?,
            })
        })
        .transpose()
    }

    // =========================================================================
    // Draft Writes
    // =========================================================================

    /// Inserts a draft sale with its items in one transaction.
    pub async fn insert_draft(&self, sale: &Sale, items: &[SaleItem]) -> DbResult<()> {
        debug!(id = %sale.id, lines = items.len(), "Inserting draft sale");

        let mut tx = self.pool.begin().await?;
        Self::insert_sale_tx(&mut tx, sale).await?;
        for item in items {
            Self::insert_item_tx(&mut tx, item).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Replaces a draft's totals and items with a fresh pricing result.
    ///
    /// Guarded on `status = 'draft'`; returns `false` (and writes nothing)
    /// when the sale has left the draft state.
    pub async fn replace_draft(&self, sale: &Sale, items: &[SaleItem]) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE sales SET
                subtotal_cents = ?2, discount_cents = ?3, tax_cents = ?4,
                included_tax_cents = ?5, shipping_cents = ?6, total_cents = ?7,
                coupon_code = ?8, points_redeemed = ?9, notes = ?10,
                updated_at = ?11
            WHERE id = ?1 AND status = 'draft'
            "#,
        )
        .bind(&sale.id)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.included_tax_cents)
        .bind(sale.shipping_cents)
        .bind(sale.total_cents)
        .bind(&sale.coupon_code)
        .bind(sale.points_redeemed)
        .bind(&sale.notes)
        .bind(sale.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
            .bind(&sale.id)
            .execute(&mut *tx)
            .await?;
        for item in items {
            Self::insert_item_tx(&mut tx, item).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Voids a draft. Guarded on `status = 'draft'`; completed sales can
    /// only be refunded, never voided.
    pub async fn mark_voided(&self, sale_id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE sales SET status = 'voided', updated_at = ?2 WHERE id = ?1 AND status = 'draft'",
        )
        .bind(sale_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Transactional Operations
    // =========================================================================

    /// Inserts a sale row inside the caller's transaction.
    pub async fn insert_sale_tx(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, tenant_id, location_id, register_session_id, cashier_id,
                customer_id, channel, status,
                subtotal_cents, discount_cents, tax_cents, included_tax_cents,
                shipping_cents, total_cents, paid_cents, change_cents,
                coupon_code, points_redeemed, points_earned, age_verified,
                receipt_number, notes, created_at, updated_at, completed_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.tenant_id)
        .bind(&sale.location_id)
        .bind(&sale.register_session_id)
        .bind(&sale.cashier_id)
        .bind(&sale.customer_id)
        .bind(sale.channel)
        .bind(sale.status)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.included_tax_cents)
        .bind(sale.shipping_cents)
        .bind(sale.total_cents)
        .bind(sale.paid_cents)
        .bind(sale.change_cents)
        .bind(&sale.coupon_code)
        .bind(sale.points_redeemed)
        .bind(sale.points_earned)
        .bind(sale.age_verified)
        .bind(&sale.receipt_number)
        .bind(&sale.notes)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.completed_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Inserts a sale item inside the caller's transaction.
    ///
    /// Sale items are snapshots: sku, name, price and tax breakdown are
    /// frozen copies, so later catalog edits never rewrite history.
    pub async fn insert_item_tx(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
        let tax_ids_json =
            serde_json::to_string(&item.tax_ids).map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, variant_id, sku, name, quantity,
                unit_price_cents, line_discount_cents, order_discount_cents,
                tax_cents, included_tax_cents, total_cents, tax_ids,
                is_service, is_kitchen, requires_id_check, min_age,
                created_at, completed_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
            )
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(&item.sku)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.line_discount_cents)
        .bind(item.order_discount_cents)
        .bind(item.tax_cents)
        .bind(item.included_tax_cents)
        .bind(item.total_cents)
        .bind(&tax_ids_json)
        .bind(item.is_service)
        .bind(item.is_kitchen)
        .bind(item.requires_id_check)
        .bind(item.min_age)
        .bind(&item.created_at)
        .bind(&item.completed_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Flips a draft to completed inside the caller's transaction,
    /// stamping settlement figures and the receipt number.
    ///
    /// Returns `false` when the sale is not (or no longer) a draft, which
    /// is how concurrent finalize attempts lose.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_completed_tx(
        conn: &mut SqliteConnection,
        sale_id: &str,
        paid_cents: i64,
        change_cents: i64,
        points_earned: i64,
        age_verified: bool,
        receipt_number: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'completed',
                paid_cents = ?2,
                change_cents = ?3,
                points_earned = ?4,
                age_verified = ?5,
                receipt_number = ?6,
                updated_at = ?7,
                completed_at = ?7
            WHERE id = ?1 AND status = 'draft'
            "#,
        )
        .bind(sale_id)
        .bind(paid_cents)
        .bind(change_cents)
        .bind(points_earned)
        .bind(age_verified)
        .bind(receipt_number)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        // Stamp the items so each line records when it settled.
        sqlx::query("UPDATE sale_items SET completed_at = ?2 WHERE sale_id = ?1")
            .bind(sale_id)
            .bind(now)
            .execute(conn)
            .await?;

        Ok(true)
    }

    /// Flips a completed sale to refunded inside the caller's transaction.
    pub async fn mark_refunded_tx(
        conn: &mut SqliteConnection,
        sale_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET status = 'refunded', updated_at = ?2
            WHERE id = ?1 AND status = 'completed'
            "#,
        )
        .bind(sale_id)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Inserts a payment inside the caller's transaction.
    pub async fn insert_payment_tx(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, sale_id, method, amount_cents, reference, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.sale_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Stores the receipt document inside the caller's transaction. The
    /// UNIQUE receipt_number constraint backs up the per-day sequence.
    pub async fn insert_receipt_tx(
        conn: &mut SqliteConnection,
        sale_id: &str,
        receipt_number: &str,
        document: &str,
        issued_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO receipts (sale_id, receipt_number, document, issued_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(sale_id)
        .bind(receipt_number)
        .bind(document)
        .bind(issued_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Next receipt sequence for a register on a given day, derived from
    /// the receipts already issued under the same prefix.
    pub async fn next_receipt_sequence_tx(
        conn: &mut SqliteConnection,
        prefix: &str,
    ) -> DbResult<i64> {
        let issued: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM receipts WHERE receipt_number LIKE ?1 || '-%'")
                .bind(prefix)
                .fetch_one(conn)
                .await?;

        Ok(issued + 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
