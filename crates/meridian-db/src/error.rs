//! # Database Error Types
//!
//! Error types for storage operations.
//!
//! ## Error Flow
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                         │
//! │                                                              │
//! │  SQLite Error (sqlx::Error)                                  │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  DbError (this module) ← adds context and categorization     │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  ServiceError (service.rs) ← merged with domain errors       │
//! │       │                                                      │
//! │       ▼                                                      │
//! │  Caller maps to its transport's error shape                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Domain rejections (insufficient stock, over-refund, invalid state) are
//! NOT `DbError`s: repositories detect them via guarded updates and the
//! service layer raises the matching `CoreError`.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A row the operation requires does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// UNIQUE index violation (duplicate SKU, coupon code, receipt number).
    #[error("duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Could not open or connect to the database.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A schema migration failed to apply.
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// A stored column could not be decoded into its domain type
    /// (corrupt JSON snapshot, unknown enum label).
    #[error("corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Pool exhausted (all connections in use).
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Anything else.
    #[error("internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a CorruptRow error.
    pub fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        DbError::CorruptRow {
            table,
            message: message.into(),
        }
    }
}

/// Maps sqlx errors onto the categories above.
///
/// SQLite reports constraint failures only through the message text, so
/// UNIQUE and FOREIGN KEY violations are detected by substring.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for storage operations.
pub type DbResult<T> = Result<T, DbError>;
