//! # Refund Repository
//!
//! Database operations for refunds and refund items.
//!
//! The over-refund guard in the planning engine works off
//! [`RefundRepository::refunded_totals`]: per sale item, the summed
//! quantity and cents already refunded across every prior refund of the
//! sale. The service reads these totals inside the refund transaction so
//! concurrent refunds of the same line serialize correctly.

use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;
use meridian_core::refund::RefundedTotals;
use meridian_core::{Refund, RefundItem};

/// Repository for refund database operations.
#[derive(Debug, Clone)]
pub struct RefundRepository {
    pool: SqlitePool,
}

impl RefundRepository {
    /// Creates a new RefundRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RefundRepository { pool }
    }

    /// Gets a refund by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(refund)
    }

    /// All refunds recorded against a sale, oldest first.
    pub async fn list_for_sale(&self, sale_id: &str) -> DbResult<Vec<Refund>> {
        let refunds = sqlx::query_as::<_, Refund>(
            "SELECT * FROM refunds WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(refunds)
    }

    /// Items of one refund.
    pub async fn get_items(&self, refund_id: &str) -> DbResult<Vec<RefundItem>> {
        let items = sqlx::query_as::<_, RefundItem>(
            "SELECT * FROM refund_items WHERE refund_id = ?1 ORDER BY rowid",
        )
        .bind(refund_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Already-refunded totals per sale item, summed across all prior
    /// refunds of the sale.
    pub async fn refunded_totals(&self, sale_id: &str) -> DbResult<HashMap<String, RefundedTotals>> {
        let mut conn = self.pool.acquire().await?;
        Self::refunded_totals_tx(&mut conn, sale_id).await
    }

    /// Like [`Self::refunded_totals`], inside the caller's transaction.
    pub async fn refunded_totals_tx(
        conn: &mut SqliteConnection,
        sale_id: &str,
    ) -> DbResult<HashMap<String, RefundedTotals>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT ri.sale_item_id,
                   SUM(ri.quantity),
                   SUM(ri.amount_cents)
            FROM refund_items ri
            JOIN refunds r ON r.id = ri.refund_id
            WHERE r.sale_id = ?1
            GROUP BY ri.sale_item_id
            "#,
        )
        .bind(sale_id)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, quantity, amount_cents)| {
                (
                    id,
                    RefundedTotals {
                        quantity,
                        amount_cents,
                    },
                )
            })
            .collect())
    }

    /// Inserts a refund with its items inside the caller's transaction.
    pub async fn insert_refund_tx(
        conn: &mut SqliteConnection,
        refund: &Refund,
        items: &[RefundItem],
    ) -> DbResult<()> {
        debug!(id = %refund.id, sale_id = %refund.sale_id, total = refund.total_cents, "Inserting refund");

        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, tenant_id, sale_id, cashier_id, reason,
                total_cents, points_revoked, points_restored, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.tenant_id)
        .bind(&refund.sale_id)
        .bind(&refund.cashier_id)
        .bind(&refund.reason)
        .bind(refund.total_cents)
        .bind(refund.points_revoked)
        .bind(refund.points_restored)
        .bind(refund.created_at)
        .execute(&mut *conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO refund_items (id, refund_id, sale_item_id, quantity, amount_cents, restock)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&item.id)
            .bind(&item.refund_id)
            .bind(&item.sale_item_id)
            .bind(item.quantity)
            .bind(item.amount_cents)
            .bind(item.restock)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}
