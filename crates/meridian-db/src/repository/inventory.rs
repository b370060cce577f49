//! # Inventory Repository
//!
//! Stock on hand plus the append-only movement ledger.
//!
//! ## Atomicity
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Every stock change is one guarded UPDATE:                   │
//! │                                                              │
//! │    UPDATE stock_on_hand                                      │
//! │    SET quantity = quantity + :delta                          │
//! │    WHERE ... AND quantity + :delta >= 0                      │
//! │                                                              │
//! │  The guard re-checks availability at write time, so stock    │
//! │  can never go negative no matter how many finalizes race.    │
//! │  rows_affected() == 0 means the decrement lost.              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every applied change also appends a ledger row in the same
//! transaction, so `stock_on_hand.quantity` always equals the sum of the
//! item's ledger deltas.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use meridian_core::{InventoryLedgerEntry, ItemRef, StockOnHand, StockReason};

/// Outcome of a guarded stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockApply {
    /// The change was applied and journaled.
    Applied,
    /// A decrement would have gone below zero; nothing was written.
    Insufficient { available: i64 },
}

/// Repository for inventory database operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets the stock row for an item at a location, if any.
    pub async fn get_on_hand(
        &self,
        tenant_id: &str,
        location_id: &str,
        item: &ItemRef,
    ) -> DbResult<Option<StockOnHand>> {
        let stock = sqlx::query_as::<_, StockOnHand>(
            r#"
            SELECT * FROM stock_on_hand
            WHERE tenant_id = ?1 AND location_id = ?2
              AND item_kind = ?3 AND item_id = ?4
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(item.kind)
        .bind(&item.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stock)
    }

    /// Items at a location at or below their reorder point.
    pub async fn low_stock(&self, tenant_id: &str, location_id: &str) -> DbResult<Vec<StockOnHand>> {
        let rows = sqlx::query_as::<_, StockOnHand>(
            r#"
            SELECT * FROM stock_on_hand
            WHERE tenant_id = ?1 AND location_id = ?2
              AND reorder_point IS NOT NULL
              AND quantity <= reorder_point
            ORDER BY quantity ASC
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Movement history for one item, newest first.
    pub async fn ledger_for_item(
        &self,
        tenant_id: &str,
        location_id: &str,
        item: &ItemRef,
        limit: i64,
    ) -> DbResult<Vec<InventoryLedgerEntry>> {
        let rows = sqlx::query_as::<_, InventoryLedgerEntry>(
            r#"
            SELECT * FROM inventory_ledger
            WHERE tenant_id = ?1 AND location_id = ?2
              AND item_kind = ?3 AND item_id = ?4
            ORDER BY created_at DESC, id DESC
            LIMIT ?5
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(item.kind)
        .bind(&item.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Sets (or clears) the reorder point for an item, creating the stock
    /// row at zero if it doesn't exist yet.
    pub async fn set_reorder_point(
        &self,
        tenant_id: &str,
        location_id: &str,
        item: &ItemRef,
        reorder_point: Option<i64>,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_on_hand (
                tenant_id, location_id, item_kind, item_id,
                quantity, reorder_point, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6)
            ON CONFLICT (tenant_id, location_id, item_kind, item_id)
            DO UPDATE SET reorder_point = excluded.reorder_point,
                          updated_at = excluded.updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(item.kind)
        .bind(&item.id)
        .bind(reorder_point)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Applies one stock delta and its ledger row in a transaction of
    /// its own. For flows that must be atomic with other writes
    /// (finalize, refund) use [`Self::apply_delta_tx`] instead.
    pub async fn apply_delta(
        &self,
        tenant_id: &str,
        location_id: &str,
        item: &ItemRef,
        delta: i64,
        reason: StockReason,
        correlation_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<StockApply> {
        let mut tx = self.pool.begin().await?;
        let outcome = Self::apply_delta_tx(
            &mut tx,
            tenant_id,
            location_id,
            item,
            delta,
            reason,
            correlation_id,
            now,
        )
        .await?;

        match outcome {
            StockApply::Applied => tx.commit().await?,
            StockApply::Insufficient { .. } => tx.rollback().await?,
        }

        Ok(outcome)
    }

    /// Applies one stock delta inside the caller's transaction.
    ///
    /// Increments create the stock row on first touch. Decrements require
    /// an existing row with enough quantity; otherwise nothing is written
    /// and the current availability is reported back.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_delta_tx(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        location_id: &str,
        item: &ItemRef,
        delta: i64,
        reason: StockReason,
        correlation_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<StockApply> {
        let updated = sqlx::query(
            r#"
            UPDATE stock_on_hand
            SET quantity = quantity + ?5, updated_at = ?6
            WHERE tenant_id = ?1 AND location_id = ?2
              AND item_kind = ?3 AND item_id = ?4
              AND quantity + ?5 >= 0
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(item.kind)
        .bind(&item.id)
        .bind(delta)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            if delta < 0 {
                // Either no row or not enough quantity. Quantity is never
                // negative, so the guard can only fail for decrements.
                let available: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COALESCE(
                        (SELECT quantity FROM stock_on_hand
                         WHERE tenant_id = ?1 AND location_id = ?2
                           AND item_kind = ?3 AND item_id = ?4),
                        0
                    )
                    "#,
                )
                .bind(tenant_id)
                .bind(location_id)
                .bind(item.kind)
                .bind(&item.id)
                .fetch_one(&mut *conn)
                .await?;

                debug!(
                    item_id = %item.id,
                    available,
                    requested = -delta,
                    "Stock decrement rejected"
                );
                return Ok(StockApply::Insufficient { available });
            }

            // First movement for this item at this location.
            sqlx::query(
                r#"
                INSERT INTO stock_on_hand (
                    tenant_id, location_id, item_kind, item_id,
                    quantity, reorder_point, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)
                "#,
            )
            .bind(tenant_id)
            .bind(location_id)
            .bind(item.kind)
            .bind(&item.id)
            .bind(delta)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO inventory_ledger (
                id, tenant_id, location_id, item_kind, item_id,
                delta, reason, correlation_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id)
        .bind(location_id)
        .bind(item.kind)
        .bind(&item.id)
        .bind(delta)
        .bind(reason)
        .bind(correlation_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(StockApply::Applied)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
