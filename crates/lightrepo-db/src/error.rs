//! # Database Error Types
//!
//! Error types for repository and query operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── Repository::create fails → DbError::CreateFailed { source }  │
//! │       ├── Repository::update fails → DbError::UpdateFailed { source }  │
//! │       └── everything else          → propagated unchanged              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Application code                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! "Nothing matched" on `update`/`delete` is not an error: those return
//! `Ok(None)` / `Ok(false)`.

use lightrepo_core::CoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Primary-key lookup found no row.
    ///
    /// ## When This Occurs
    /// - `find_or_fail` with an id that doesn't exist
    /// - The row exists but is filtered out by default conditions
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A condition-filtered lookup matched no row.
    ///
    /// ## When This Occurs
    /// - `find_first_or_fail` / `first_or_fail` on an empty result
    #[error("No {entity} matches the given conditions")]
    NoMatch { entity: String },

    /// Creating an entity failed. `source` is the underlying cause.
    #[error("Failed to create model: {entity}")]
    CreateFailed {
        entity: String,
        #[source]
        source: Box<DbError>,
    },

    /// Updating a found entity failed. `source` is the underlying cause.
    #[error("Failed to update model: {entity}")]
    UpdateFailed {
        entity: String,
        #[source]
        source: Box<DbError>,
    },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting or updating to a duplicate value in a UNIQUE column
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created or opened
    /// - Invalid connection options
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    ///
    /// ## When This Occurs
    /// - Unknown table or column
    /// - NOT NULL / CHECK constraint failures
    /// - Any other runtime SQL error
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed to begin or commit.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A table or column name was rejected before reaching SQL.
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Internal database error.
    #[error("Internal database error: {0}")]
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

    /// Creates a NoMatch error for a given entity type.
    pub fn no_match(entity: impl Into<String>) -> Self {
        DbError::NoMatch {
            entity: entity.into(),
        }
    }

    /// Wraps `cause` as a create failure of `entity`.
    pub fn create_failed(entity: impl Into<String>, cause: DbError) -> Self {
        DbError::CreateFailed {
            entity: entity.into(),
            source: Box::new(cause),
        }
    }

    /// Wraps `cause` as an update failure of `entity`.
    pub fn update_failed(entity: impl Into<String>, cause: DbError) -> Self {
        DbError::UpdateFailed {
            entity: entity.into(),
            source: Box::new(cause),
        }
    }

    /// The wrapped cause of a create/update failure, if any.
    pub fn cause(&self) -> Option<&DbError> {
        match self {
            DbError::CreateFailed { source, .. } | DbError::UpdateFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NoMatch
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::ColumnNotFound → DbError::QueryFailed (row shape mismatch)
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NoMatch {
                entity: "Record".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
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

            // A projection left out a field the row type needs
            sqlx::Error::ColumnNotFound(column) => {
                DbError::QueryFailed(format!("no column found for name: {}", column))
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidIdentifier(ident) => DbError::InvalidIdentifier(ident),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
