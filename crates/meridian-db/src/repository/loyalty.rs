//! # Loyalty Repository
//!
//! Programs, customer accounts and the points ledger.
//!
//! Balances follow the same discipline as stock: every change is a
//! guarded UPDATE plus a ledger append in the same transaction, so a
//! balance always equals the sum of its ledger entries and can never go
//! negative under concurrent redemptions.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use meridian_core::{LoyaltyAccount, LoyaltyEventKind, LoyaltyLedgerEntry, LoyaltyProgram};

/// Repository for loyalty database operations.
#[derive(Debug, Clone)]
pub struct LoyaltyRepository {
    pool: SqlitePool,
}

impl LoyaltyRepository {
    /// Creates a new LoyaltyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LoyaltyRepository { pool }
    }

    /// The tenant's active loyalty program, if one exists.
    pub async fn get_program(&self, tenant_id: &str) -> DbResult<Option<LoyaltyProgram>> {
        let program = sqlx::query_as::<_, LoyaltyProgram>(
            "SELECT * FROM loyalty_programs WHERE tenant_id = ?1 AND is_active = 1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(program)
    }

    /// Inserts a loyalty program.
    pub async fn insert_program(&self, program: &LoyaltyProgram) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_programs (
                id, tenant_id, redeem_rate_cents_per_point,
                points_per_currency_unit, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&program.id)
        .bind(&program.tenant_id)
        .bind(program.redeem_rate_cents_per_point)
        .bind(program.points_per_currency_unit)
        .bind(program.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a customer's account.
    pub async fn get_account(
        &self,
        tenant_id: &str,
        customer_id: &str,
    ) -> DbResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            "SELECT * FROM loyalty_accounts WHERE tenant_id = ?1 AND customer_id = ?2",
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Gets a customer's account, creating an empty one on first touch.
    pub async fn get_or_create_account(
        &self,
        tenant_id: &str,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<LoyaltyAccount> {
        if let Some(account) = self.get_account(tenant_id, customer_id).await? {
            return Ok(account);
        }

        let account = LoyaltyAccount {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            customer_id: customer_id.to_string(),
            balance: 0,
            created_at: now,
            updated_at: now,
        };

        debug!(customer_id, "Creating loyalty account");

        // ON CONFLICT keeps first-touch races harmless: both creators end
        // up reading the same row.
        sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (id, tenant_id, customer_id, balance, created_at, updated_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?5)
            ON CONFLICT (tenant_id, customer_id) DO NOTHING
            "#,
        )
        .bind(&account.id)
        .bind(tenant_id)
        .bind(customer_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(self
            .get_account(tenant_id, customer_id)
            .await?
            .unwrap_or(account))
    }

    /// Ledger history for an account, newest first.
    pub async fn get_ledger(&self, account_id: &str, limit: i64) -> DbResult<Vec<LoyaltyLedgerEntry>> {
        let entries = sqlx::query_as::<_, LoyaltyLedgerEntry>(
            r#"
            SELECT * FROM loyalty_ledger
            WHERE account_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    // =========================================================================
    // Transactional Operations
    // =========================================================================

    /// Gets a customer's account inside the caller's transaction.
    pub async fn get_account_tx(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        customer_id: &str,
    ) -> DbResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            "SELECT * FROM loyalty_accounts WHERE tenant_id = ?1 AND customer_id = ?2",
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;

        Ok(account)
    }

    /// Current balance, read inside the caller's transaction.
    pub async fn balance_tx(conn: &mut SqliteConnection, account_id: &str) -> DbResult<i64> {
        let balance: i64 =
            sqlx::query_scalar("SELECT balance FROM loyalty_accounts WHERE id = ?1")
                .bind(account_id)
                .fetch_one(conn)
                .await?;

        Ok(balance)
    }

    /// Applies a signed points delta with a ledger entry inside the
    /// caller's transaction.
    ///
    /// Guarded so the balance never goes negative: returns `false` and
    /// writes nothing when a deduction exceeds the balance (a redemption
    /// losing the race, or a revoke against already-spent points).
    pub async fn apply_points_tx(
        conn: &mut SqliteConnection,
        account_id: &str,
        delta: i64,
        kind: LoyaltyEventKind,
        sale_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        if delta == 0 {
            return Ok(true);
        }

        let result = sqlx::query(
            r#"
            UPDATE loyalty_accounts
            SET balance = balance + ?2, updated_at = ?3
            WHERE id = ?1 AND balance + ?2 >= 0
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO loyalty_ledger (id, account_id, kind, points, sale_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(kind)
        .bind(delta)
        .bind(sale_id)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(true)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
