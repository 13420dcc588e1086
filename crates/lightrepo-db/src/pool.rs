//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite, plus the entry
//! points for queries and repositories.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Handle                                    │
//! │                                                                         │
//! │  DbConfig::new(path) / DbConfig::from_env()                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │ Database (Clone, cheap)                  │                           │
//! │  │   SqlitePool      ─ Conn1 Conn2 ...      │  (max_connections)        │
//! │  │   QueryListeners  ─ shared by clones     │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├── db.repository::<User>()   → Repository<User>                 │
//! │       ├── db.query::<User>()        → Query<User>   (unscoped)         │
//! │       └── db.table("users")         → Query<Record> (untyped)          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Environment
//!
//! | Variable                           | Default        |
//! |------------------------------------|----------------|
//! | `LIGHTREPO_DATABASE_PATH`          | `lightrepo.db` |
//! | `LIGHTREPO_MAX_CONNECTIONS`        | `5`            |
//! | `LIGHTREPO_MIN_CONNECTIONS`        | `1`            |
//! | `LIGHTREPO_CONNECT_TIMEOUT_SECS`   | `30`           |
//!
//! A path of `:memory:` selects a private in-memory database.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{env_or, RepositoryOptions};
use crate::error::{DbError, DbResult};
use crate::listener::QueryListeners;
use crate::model::Entity;
use crate::query::{Query, Record};
use crate::repository::Repository;

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/app.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,
}

impl DbConfig {
    /// Creates a configuration for the database file at `path`. The file is
    /// created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// An unparsable value fails with [`DbError::Config`].
    pub fn from_env() -> DbResult<Self> {
        let path: String = env_or("LIGHTREPO_DATABASE_PATH", "lightrepo.db".to_string())?;
        let defaults = DbConfig::new(path);

        Ok(DbConfig {
            max_connections: env_or("LIGHTREPO_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: env_or("LIGHTREPO_MIN_CONNECTIONS", defaults.min_connections)?,
            connect_timeout: Duration::from_secs(env_or(
                "LIGHTREPO_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )?),
            ..defaults
        })
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// The pool holds exactly one connection that never idles out, since
    /// each SQLite connection to `:memory:` sees its own database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared database handle: the connection pool and its statement listeners.
///
/// Cloning is cheap and clones share both.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    listeners: QueryListeners,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for file databases
    ///    - NORMAL synchronous
    ///    - Foreign keys enabled
    /// 3. Creates the connection pool
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let in_memory = config.is_in_memory();

        let connect_options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true)
        };
        let connect_options = connect_options.foreign_keys(true);

        debug!(in_memory, "Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout);

        pool_options = if in_memory {
            pool_options
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            pool_options.idle_timeout(Some(config.idle_timeout))
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        Ok(Database::from_pool(pool))
    }

    /// Wraps an existing pool with a fresh listener registry.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Database {
            pool,
            listeners: QueryListeners::new(),
        }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Statement listeners notified by every query run through this handle.
    pub fn listeners(&self) -> &QueryListeners {
        &self.listeners
    }

    pub async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Starts a transaction on a pooled connection.
    ///
    /// The transaction rolls back when dropped without `commit`.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }

    /// Untyped query over `table`. No default conditions apply.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut query = db.table("users");
    /// query.where_eq("active", true);
    /// let total = query.count().await?;
    /// ```
    pub fn table(&self, table: impl Into<String>) -> Query<Record> {
        Query::table(self.clone(), table)
    }

    /// Unscoped query over `E`'s table.
    pub fn query<E: Entity>(&self) -> Query<E> {
        Query::entity(self.clone())
    }

    /// Repository for `E` with default options.
    pub fn repository<E: Entity>(&self) -> Repository<E> {
        Repository::new(self.clone())
    }

    pub fn repository_with<E: Entity>(&self, options: RepositoryOptions) -> Repository<E> {
        Repository::with_options(self.clone(), options)
    }

    /// Closes the database connection pool.
    ///
    /// ## Note
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert!(db.listeners().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_state_survives_reacquire() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        sqlx::query("CREATE TABLE t (x INTEGER)")
            .execute(db.pool())
            .await
            .unwrap();

        let mut conn = db.acquire().await.unwrap();
        sqlx::query("INSERT INTO t VALUES (1)")
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        assert_eq!(db.table("t").count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_reports_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(!db.health_check().await);
        assert!(matches!(
            db.acquire().await,
            Err(DbError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_file_database_is_created() {
        let path = env::temp_dir().join(format!("lightrepo-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();

        assert!(db.health_check().await);
        assert!(path.exists());

        db.close().await;
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .connect_timeout(Duration::from_secs(3));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("LIGHTREPO_DATABASE_PATH", ":memory:");
        env::set_var("LIGHTREPO_MAX_CONNECTIONS", "3");

        let config = DbConfig::from_env().unwrap();
        assert!(config.is_in_memory());
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.min_connections, 1);

        env::set_var("LIGHTREPO_MAX_CONNECTIONS", "many");
        assert!(matches!(DbConfig::from_env(), Err(DbError::Config(_))));

        env::remove_var("LIGHTREPO_MAX_CONNECTIONS");
        env::remove_var("LIGHTREPO_DATABASE_PATH");
    }
}
