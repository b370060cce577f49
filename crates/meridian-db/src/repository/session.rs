//! # Register Session Repository
//!
//! Register sessions track an open cash drawer: cash tenders add to the
//! expected amount at finalize, cash refunds subtract at refund. The
//! adjustment is a relative UPDATE inside the finalize/refund transaction,
//! so the expected figure stays consistent with the sales that produced it.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use meridian_core::{RegisterSession, SessionStatus};

/// Repository for register session operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Gets a session by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<RegisterSession>> {
        let session =
            sqlx::query_as::<_, RegisterSession>("SELECT * FROM register_sessions WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(session)
    }

    /// The open session for a register, if any.
    pub async fn get_open_session(
        &self,
        tenant_id: &str,
        register_id: &str,
    ) -> DbResult<Option<RegisterSession>> {
        let session = sqlx::query_as::<_, RegisterSession>(
            r#"
            SELECT * FROM register_sessions
            WHERE tenant_id = ?1 AND register_id = ?2 AND status = 'open'
            ORDER BY opened_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(register_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Opens a session with a starting cash float.
    pub async fn open_session(
        &self,
        tenant_id: &str,
        register_id: &str,
        opening_cash_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<RegisterSession> {
        let session = RegisterSession {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            register_id: register_id.to_string(),
            status: SessionStatus::Open,
            expected_cash_cents: opening_cash_cents,
            opened_at: now,
            closed_at: None,
        };

        debug!(register_id, opening_cash_cents, "Opening register session");

        sqlx::query(
            r#"
            INSERT INTO register_sessions (
                id, tenant_id, register_id, status, expected_cash_cents, opened_at, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)
            "#,
        )
        .bind(&session.id)
        .bind(&session.tenant_id)
        .bind(&session.register_id)
        .bind(session.status)
        .bind(session.expected_cash_cents)
        .bind(session.opened_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    /// Closes a session. Guarded on `status = 'open'`.
    pub async fn close_session(&self, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE register_sessions SET status = 'closed', closed_at = ?2
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Adjusts the expected cash of an open session by a signed delta,
    /// inside the caller's transaction. No-op (returning `false`) when the
    /// session is closed.
    pub async fn adjust_expected_cash_tx(
        conn: &mut SqliteConnection,
        session_id: &str,
        delta_cents: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE register_sessions
            SET expected_cash_cents = expected_cash_cents + ?2
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(session_id)
        .bind(delta_cents)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
