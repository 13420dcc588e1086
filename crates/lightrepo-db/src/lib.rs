//! # lightrepo-db: Generic Repository over SQLite
//!
//! A generic [`Repository`] for any [`Entity`], built on a small query
//! builder and `sqlx`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        lightrepo Data Flow                              │
//! │                                                                         │
//! │  Application code                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   lightrepo-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐   │   │
//! │  │   │ Repository<E>│──►│ Query<R>     │──►│ executor         │   │   │
//! │  │   │ (repository) │   │ Criteria     │   │ bind, run, time  │   │   │
//! │  │   │ defaults,    │   │ Condition    │   │ debug! + notify  │   │   │
//! │  │   │ tx, errors   │   │ (query)      │   │ QueryListeners   │   │   │
//! │  │   └──────────────┘   └──────────────┘   └──────────────────┘   │   │
//! │  │          │                                       │              │   │
//! │  │          ▼                                       ▼              │   │
//! │  │   ┌──────────────┐                       ┌──────────────────┐   │   │
//! │  │   │ model        │                       │ Database (pool)  │   │   │
//! │  │   │ Entity trait │                       │ SqlitePool       │   │   │
//! │  │   └──────────────┘                       └──────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and the [`Database`] handle
//! - [`config`] - Repository options
//! - [`error`] - Database error types
//! - [`listener`] - Statement listeners and [`QueryCollector`]
//! - [`query`] - Conditions, criteria and the query builder
//! - [`executor`] - Statement execution
//! - [`model`] - The [`Entity`] trait
//! - [`repository`] - The generic [`Repository`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lightrepo_db::{Database, DbConfig, Entity, Repository, RepositoryOptions};
//! use lightrepo_core::{attributes, Columns};
//!
//! let db = Database::new(DbConfig::new("app.db")).await?;
//! let users = db.repository_with::<User>(
//!     RepositoryOptions::default().default_condition("active", true),
//! );
//!
//! let ada = users.create(&attributes! { "name" => "Ada" }).await?;
//! let found = users.find(ada.id, &Columns::All).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod executor;
pub mod listener;
pub mod model;
pub mod pool;
pub mod query;
pub mod repository;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, RepositoryOptions};
pub use error::{DbError, DbResult};
pub use executor::{FetchRow, Statement};
pub use listener::{QueryCollector, QueryListeners, Subscription};
pub use model::{Entity, UpdateOptions};
pub use pool::{Database, DbConfig};
pub use query::{
    Condition, ConditionFn, Criteria, Direction, Modifier, Operator, Plucked, Query, RawExpression,
    Record,
};
pub use repository::Repository;

// Core types used throughout the public API
pub use lightrepo_core::{attributes, Attributes, Columns, QueryEvent, Value};
