//! # Audit Repository
//!
//! Append-only audit trail for operations that change money or stock:
//! finalize, refund, void, manual inventory adjustments.
//!
//! Audit writes never fail the business operation they describe. A failed
//! append is logged with `warn!` and swallowed; the sale or refund commit
//! stands on its own.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

/// Repository for audit log operations.
#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

/// One audit row as read back for inspection.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: String,
    pub tenant_id: String,
    pub actor_id: String,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRepository {
    /// Creates a new AuditRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditRepository { pool }
    }

    /// Appends one audit entry. Failures are logged and swallowed.
    #[allow(clippy::too_many_arguments)]
    pub async fn log(
        &self,
        tenant_id: &str,
        actor_id: &str,
        action: &str,
        entity: &str,
        entity_id: &str,
        detail: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_log (id, tenant_id, actor_id, action, entity, entity_id, detail, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id)
        .bind(actor_id)
        .bind(action)
        .bind(entity)
        .bind(entity_id)
        .bind(detail)
        .bind(now)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(action, entity, entity_id, error = %e, "Audit log append failed");
        }
    }

    /// History for one entity, newest first.
    pub async fn for_entity(
        &self,
        tenant_id: &str,
        entity: &str,
        entity_id: &str,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, crate::error::DbError> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT * FROM audit_log
            WHERE tenant_id = ?1 AND entity = ?2 AND entity_id = ?3
            ORDER BY created_at DESC, id DESC
            LIMIT ?4
            "#,
        )
        .bind(tenant_id)
        .bind(entity)
        .bind(entity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
