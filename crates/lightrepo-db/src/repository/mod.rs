//! # Repository
//!
//! Generic repository over one [`Entity`] type.
//!
//! ## Query Construction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Every Scoped Operation                               │
//! │                                                                         │
//! │  repo.find_by(conditions, modifier, columns)                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  build_query(conditions, modifier)                                     │
//! │       │                                                                 │
//! │       ├── 1. Query<E> scoped by default conditions                     │
//! │       ├── 2. caller conditions (one nested group)                      │
//! │       └── 3. modifier (wheres, ordering, limit, offset)                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  get / first / delete / count / exists / pluck / chunk                 │
//! │                                                                         │
//! │  force_raw (count, exists, pluck) starts from raw() instead, which     │
//! │  skips step 1.                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Translation
//! Failures of `create` and of the write half of `update` come back as
//! [`DbError::CreateFailed`] / [`DbError::UpdateFailed`] carrying the entity
//! name and the underlying error. Lookups and everything else propagate
//! their errors unchanged.
//!
//! ## Usage
//! ```rust,ignore
//! let users = db.repository_with::<User>(
//!     RepositoryOptions::default().default_condition("active", true),
//! );
//!
//! let admins = users
//!     .find_by(Some(&Condition::eq([("role", "admin")])), None, &Columns::All)
//!     .await?;
//!
//! let renamed = users
//!     .update(7, &attributes! { "name" => "Ada" }, UpdateOptions::default())
//!     .await?;
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::ops::ControlFlow;

use lightrepo_core::{Attributes, Columns, Value};
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::config::RepositoryOptions;
use crate::error::{DbError, DbResult};
use crate::listener::QueryCollector;
use crate::model::{self, Entity, UpdateOptions};
use crate::pool::Database;
use crate::query::{Condition, Modifier, Plucked, Query, Record};

/// CRUD and query operations for one entity type.
pub struct Repository<E: Entity> {
    db: Database,
    options: RepositoryOptions,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Repository {
            db: self.db.clone(),
            options: self.options.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::entity_name())
            .field("options", &self.options)
            .finish()
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(db: Database) -> Self {
        Self::with_options(db, RepositoryOptions::default())
    }

    pub fn with_options(db: Database, options: RepositoryOptions) -> Self {
        Repository {
            db,
            options,
            _entity: PhantomData,
        }
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Short entity type name, as used in error messages.
    pub fn entity_name(&self) -> &'static str {
        E::entity_name()
    }

    /// Starts collecting every statement run through this repository's
    /// database. Collection stops when the collector is dropped or finished.
    pub fn with_query_collection(&self) -> QueryCollector {
        QueryCollector::attach(self.db.listeners())
    }

    // =========================================================================
    // Query Construction
    // =========================================================================

    /// Entity query with default conditions applied.
    pub fn query(&self) -> Query<E> {
        Query::entity(self.db.clone()).scoped(&self.options.default_conditions)
    }

    /// Untyped query over the entity's table. Default conditions do not apply.
    pub fn raw(&self) -> Query<Record> {
        self.db.table(E::TABLE)
    }

    /// Scoped query, then `conditions`, then `modifier`.
    pub fn build_query(
        &self,
        conditions: Option<&Condition>,
        modifier: Option<Modifier<'_>>,
    ) -> Query<E> {
        self.query().refine(conditions, modifier)
    }

    fn raw_query(
        &self,
        conditions: Option<&Condition>,
        modifier: Option<Modifier<'_>>,
    ) -> Query<Record> {
        self.raw().refine(conditions, modifier)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Entity with primary key `id`, if it exists within the default scope.
    ///
    /// With [`Columns::Only`], every field of `E` outside the projection must
    /// be `#[sqlx(default)]`; otherwise decoding fails with
    /// [`DbError::QueryFailed`].
    pub async fn find(&self, id: impl Into<Value>, columns: &Columns) -> DbResult<Option<E>> {
        self.query().find(id, columns).await
    }

    /// Like [`find`](Self::find), failing with [`DbError::NotFound`].
    pub async fn find_or_fail(&self, id: impl Into<Value>, columns: &Columns) -> DbResult<E> {
        self.query().find_or_fail(id, columns).await
    }

    /// Every scoped entity matching `conditions` and `modifier`.
    ///
    /// Projections follow the same rule as [`find`](Self::find).
    pub async fn find_by(
        &self,
        conditions: Option<&Condition>,
        modifier: Option<Modifier<'_>>,
        columns: &Columns,
    ) -> DbResult<Vec<E>> {
        self.build_query(conditions, modifier).get(columns).await
    }

    /// First scoped match. Projections follow the same rule as
    /// [`find`](Self::find).
    pub async fn find_first(
        &self,
        conditions: Option<&Condition>,
        modifier: Option<Modifier<'_>>,
        columns: &Columns,
    ) -> DbResult<Option<E>> {
        self.build_query(conditions, modifier).first(columns).await
    }

    /// Like [`find_first`](Self::find_first), failing with [`DbError::NoMatch`].
    pub async fn find_first_or_fail(
        &self,
        conditions: Option<&Condition>,
        modifier: Option<Modifier<'_>>,
        columns: &Columns,
    ) -> DbResult<E> {
        self.build_query(conditions, modifier)
            .first_or_fail(columns)
            .await
    }

    /// Every entity in scope.
    pub async fn all(&self) -> DbResult<Vec<E>> {
        self.query().get(&Columns::All).await
    }

    pub async fn exists(
        &self,
        conditions: Option<&Condition>,
        modifier: Option<Modifier<'_>>,
        force_raw: bool,
    ) -> DbResult<bool> {
        if force_raw {
            self.raw_query(conditions, modifier).exists().await
        } else {
            self.build_query(conditions, modifier).exists().await
        }
    }

    pub async fn count(
        &self,
        conditions: Option<&Condition>,
        modifier: Option<Modifier<'_>>,
        force_raw: bool,
    ) -> DbResult<u64> {
        if force_raw {
            self.raw_query(conditions, modifier).count().await
        } else {
            self.build_query(conditions, modifier).count().await
        }
    }

    /// Values of `column`, keyed by `key` when given.
    pub async fn pluck(
        &self,
        column: &str,
        key: Option<&str>,
        modifier: Option<Modifier<'_>>,
        force_raw: bool,
    ) -> DbResult<Plucked> {
        if force_raw {
            self.raw_query(None, modifier).pluck(column, key).await
        } else {
            self.build_query(None, modifier).pluck(column, key).await
        }
    }

    /// Feeds entities in scope to `callback`, `size` at a time.
    ///
    /// Batches follow primary-key order unless `modifier` sets an order.
    /// Returning `ControlFlow::Break(())` from the callback ends the scan.
    pub async fn chunk<F>(&self, size: u64, callback: F, modifier: Option<Modifier<'_>>) -> DbResult<()>
    where
        F: FnMut(Vec<E>) -> ControlFlow<()> + Send,
    {
        let completed = self.build_query(None, modifier).chunk(size, callback).await?;
        debug!(entity = E::entity_name(), size, completed, "Chunked scan finished");
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a new entity. Any failure becomes [`DbError::CreateFailed`].
    pub async fn create(&self, data: &Attributes) -> DbResult<E> {
        debug!(entity = E::entity_name(), columns = data.len(), "Creating");

        self.insert(data).await.map_err(|e| {
            warn!(entity = E::entity_name(), error = %e, "Create failed");
            DbError::create_failed(E::entity_name(), e)
        })
    }

    async fn insert(&self, data: &Attributes) -> DbResult<E> {
        let mut conn = self.db.acquire().await?;
        model::insert::<E>(&mut conn, self.db.listeners(), data).await
    }

    /// Finds the entity by `id` within scope and applies `data`.
    ///
    /// ## Returns
    /// * `Ok(Some(entity))` - the entity as stored after the update
    /// * `Ok(None)` - no entity with that id in scope
    /// * `Err(DbError::UpdateFailed)` - the write itself failed
    ///
    /// With `use_transactions` the lookup and the write run in one
    /// transaction.
    pub async fn update(
        &self,
        id: impl Into<Value>,
        data: &Attributes,
        options: UpdateOptions,
    ) -> DbResult<Option<E>> {
        let id = id.into();
        debug!(
            entity = E::entity_name(),
            id = %id,
            transactional = self.options.use_transactions,
            "Updating"
        );

        if self.options.use_transactions {
            let mut tx = self.db.begin().await?;
            let updated = self.update_on(&mut tx, &id, data, &options).await?;
            tx.commit()
                .await
                .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
            Ok(updated)
        } else {
            let mut conn = self.db.acquire().await?;
            self.update_on(&mut conn, &id, data, &options).await
        }
    }

    async fn update_on(
        &self,
        conn: &mut SqliteConnection,
        id: &Value,
        data: &Attributes,
        options: &UpdateOptions,
    ) -> DbResult<Option<E>> {
        let found = match self.query().find_on(conn, id, &Columns::All).await? {
            Some(found) => found,
            None => return Ok(None),
        };

        model::update_by_key::<E>(conn, self.db.listeners(), &found.key(), data, options)
            .await
            .map_err(|e| {
                warn!(entity = E::entity_name(), id = %id, error = %e, "Update failed");
                DbError::update_failed(E::entity_name(), e)
            })
    }

    /// Deletes the entity with `id` if it exists within scope.
    pub async fn delete(&self, id: impl Into<Value>) -> DbResult<bool> {
        let id = id.into();
        let mut conn = self.db.acquire().await?;

        match self.query().find_on(&mut conn, &id, &Columns::All).await? {
            Some(found) => {
                model::delete_by_key::<E>(&mut conn, self.db.listeners(), &found.key()).await
            }
            None => Ok(false),
        }
    }

    /// Deletes `entity` by its primary key, ignoring default conditions.
    pub async fn delete_model(&self, entity: &E) -> DbResult<bool> {
        let mut conn = self.db.acquire().await?;
        model::delete_by_key::<E>(&mut conn, self.db.listeners(), &entity.key()).await
    }

    /// Deletes every matching entity in scope and returns how many went.
    pub async fn delete_by(
        &self,
        conditions: Option<&Condition>,
        modifier: Option<Modifier<'_>>,
    ) -> DbResult<u64> {
        let removed = self.build_query(conditions, modifier).delete().await?;
        debug!(entity = E::entity_name(), removed, "Deleted by conditions");
        Ok(removed)
    }

    /// Updates the first entity in scope matching `attributes` with `values`,
    /// or creates one from `attributes` merged with `values`.
    pub async fn update_or_create(&self, attributes: Attributes, values: Attributes) -> DbResult<E> {
        self.query().update_or_create(attributes, values).await
    }
}
