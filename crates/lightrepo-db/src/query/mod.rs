//! # Query Builder
//!
//! A small builder over one table. `Query<E>` decodes rows into an
//! [`Entity`](crate::Entity); `Query<Record>` is the raw, untyped form.
//!
//! ## Anatomy of a Scoped Query
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SELECT * FROM "users"                                                  │
//! │  WHERE "active" = ?                  ◄── scope (default conditions)     │
//! │    AND ("name" = ?)                  ◄── caller condition               │
//! │    AND "age" > ?                     ◄── modifier                       │
//! │  ORDER BY "name" ASC LIMIT 10        ◄── modifier                       │
//! │                                                                         │
//! │  If the caller part contains a top-level OR it is wrapped in           │
//! │  parentheses, so the scope always applies to every row.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod criteria;
mod record;

use std::fmt;
use std::marker::PhantomData;
use std::ops::{ControlFlow, Deref, DerefMut};

use lightrepo_core::validation::{quote_column, quote_table};
use lightrepo_core::{Attributes, Columns, Value};
use sqlx::SqliteConnection;
use tracing::debug;

pub use criteria::{Condition, ConditionFn, Criteria, Direction, Operator, RawExpression};
pub use record::{Plucked, Record};

pub(crate) use criteria::{equality_predicates, Predicate};

use criteria::{render_orders, render_paging, render_predicates};

use crate::error::{DbError, DbResult};
use crate::executor::{self, FetchRow, Statement};
use crate::model::{self, Entity, UpdateOptions};
use crate::pool::Database;

/// Caller-supplied refinement applied to a query after its conditions.
pub type Modifier<'a> = &'a (dyn Fn(&mut Criteria) + Sync);

/// Query over one table, decoding rows as `R`.
pub struct Query<R = Record> {
    db: Database,
    table: String,
    label: String,
    key_column: Option<String>,
    scope: Vec<Predicate>,
    criteria: Criteria,
    _row: PhantomData<fn() -> R>,
}

impl<R> Clone for Query<R> {
    fn clone(&self) -> Self {
        Query {
            db: self.db.clone(),
            table: self.table.clone(),
            label: self.label.clone(),
            key_column: self.key_column.clone(),
            scope: self.scope.clone(),
            criteria: self.criteria.clone(),
            _row: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.table)
            .field("scope", &self.scope)
            .field("criteria", &self.criteria)
            .finish()
    }
}

impl<R> Deref for Query<R> {
    type Target = Criteria;

    fn deref(&self) -> &Criteria {
        &self.criteria
    }
}

impl<R> DerefMut for Query<R> {
    fn deref_mut(&mut self) -> &mut Criteria {
        &mut self.criteria
    }
}

impl Query<Record> {
    /// Unscoped query over `table`.
    pub(crate) fn table(db: Database, table: impl Into<String>) -> Self {
        let table = table.into();
        Query {
            db,
            label: table.clone(),
            table,
            key_column: None,
            scope: Vec::new(),
            criteria: Criteria::new(),
            _row: PhantomData,
        }
    }
}

impl<E: Entity> Query<E> {
    /// Unscoped query over `E`'s table.
    pub(crate) fn entity(db: Database) -> Self {
        Query {
            db,
            table: E::TABLE.to_string(),
            label: E::entity_name().to_string(),
            key_column: Some(E::PRIMARY_KEY.to_string()),
            scope: Vec::new(),
            criteria: Criteria::new(),
            _row: PhantomData,
        }
    }
}

// =============================================================================
// Building & Rendering
// =============================================================================

impl<R> Query<R> {
    /// Adds default conditions. They render ahead of, and apart from, every
    /// other clause.
    pub(crate) fn scoped(mut self, defaults: &Attributes) -> Self {
        self.scope.extend(equality_predicates(defaults));
        self
    }

    /// Applies an optional condition then an optional modifier.
    pub fn refine(mut self, condition: Option<&Condition>, modifier: Option<Modifier<'_>>) -> Self {
        if let Some(condition) = condition {
            self.criteria.apply(condition);
        }
        if let Some(modifier) = modifier {
            modifier(&mut self.criteria);
        }
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn is_scoped(&self) -> bool {
        !self.scope.is_empty()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn render_where(&self, stmt: &mut Statement) -> DbResult<()> {
        let has_scope = !self.scope.is_empty();
        let has_wheres = self.criteria.has_wheres();

        if !has_scope && !has_wheres {
            return Ok(());
        }

        stmt.push(" WHERE ");
        render_predicates(&self.scope, stmt)?;

        if has_wheres {
            if has_scope {
                stmt.push(" AND ");
            }
            let wrap = has_scope && self.criteria.has_top_level_or();
            if wrap {
                stmt.push("(");
            }
            render_predicates(&self.criteria.wheres, stmt)?;
            if wrap {
                stmt.push(")");
            }
        }
        Ok(())
    }

    fn render_tail(&self, stmt: &mut Statement) -> DbResult<()> {
        render_orders(&self.criteria.orders, stmt)?;
        render_paging(&self.criteria, stmt);
        Ok(())
    }

    /// `SELECT <columns> FROM … WHERE … ORDER BY … LIMIT …`
    pub fn select_statement(&self, columns: &Columns) -> DbResult<Statement> {
        let mut stmt = Statement::new("SELECT ");
        match columns {
            Columns::Only(list) if !list.is_empty() => {
                let quoted = list
                    .iter()
                    .map(|c| quote_column(c))
                    .collect::<Result<Vec<_>, _>>()?;
                stmt.push_list(quoted);
            }
            _ => {
                stmt.push("*");
            }
        }

        stmt.push(" FROM ").push(quote_table(&self.table)?);
        self.render_where(&mut stmt)?;
        self.render_tail(&mut stmt)?;

        Ok(stmt)
    }

    pub fn to_statement(&self) -> DbResult<Statement> {
        self.select_statement(&Columns::All)
    }

    /// SQL text of the select statement, placeholders unfilled.
    pub fn to_sql(&self) -> DbResult<String> {
        Ok(self.to_statement()?.sql().to_string())
    }

    pub fn count_statement(&self) -> DbResult<Statement> {
        let table = quote_table(&self.table)?;

        if self.criteria.is_paged() {
            let mut stmt = Statement::new("SELECT COUNT(*) FROM (SELECT 1 FROM ");
            stmt.push(table);
            self.render_where(&mut stmt)?;
            self.render_tail(&mut stmt)?;
            stmt.push(")");
            Ok(stmt)
        } else {
            let mut stmt = Statement::new("SELECT COUNT(*) FROM ");
            stmt.push(table);
            self.render_where(&mut stmt)?;
            Ok(stmt)
        }
    }

    pub fn exists_statement(&self) -> DbResult<Statement> {
        let mut stmt = Statement::new("SELECT EXISTS(SELECT 1 FROM ");
        stmt.push(quote_table(&self.table)?);
        self.render_where(&mut stmt)?;
        self.render_tail(&mut stmt)?;
        stmt.push(")");

        Ok(stmt)
    }

    pub fn delete_statement(&self) -> DbResult<Statement> {
        let table = quote_table(&self.table)?;
        let mut stmt = Statement::new("DELETE FROM ");
        stmt.push(&table);

        // DELETE … ORDER BY/LIMIT needs a compile-time flag in SQLite
        if self.criteria.is_paged() || self.criteria.has_orders() {
            stmt.push(" WHERE rowid IN (SELECT rowid FROM ").push(&table);
            self.render_where(&mut stmt)?;
            self.render_tail(&mut stmt)?;
            stmt.push(")");
        } else {
            self.render_where(&mut stmt)?;
        }

        Ok(stmt)
    }

    pub fn pluck_statement(&self, column: &str, key: Option<&str>) -> DbResult<Statement> {
        let columns = match key {
            Some(key) => Columns::only([column, key]),
            None => Columns::only([column]),
        };
        self.select_statement(&columns)
    }
}

// =============================================================================
// Execution
// =============================================================================

impl<R: FetchRow> Query<R> {
    /// All matching rows.
    pub async fn get(&self, columns: &Columns) -> DbResult<Vec<R>> {
        let statement = self.select_statement(columns)?;
        let mut conn = self.db.acquire().await?;
        executor::fetch_all(&mut conn, self.db.listeners(), statement).await
    }

    /// First matching row.
    pub async fn first(&self, columns: &Columns) -> DbResult<Option<R>> {
        let mut conn = self.db.acquire().await?;
        self.first_on(&mut conn, columns).await
    }

    /// First matching row, or [`DbError::NoMatch`].
    pub async fn first_or_fail(&self, columns: &Columns) -> DbResult<R> {
        self.first(columns)
            .await?
            .ok_or_else(|| DbError::no_match(self.label.clone()))
    }

    pub(crate) async fn first_on(
        &self,
        conn: &mut SqliteConnection,
        columns: &Columns,
    ) -> DbResult<Option<R>> {
        let mut query = self.clone();
        query.criteria.limit(1);
        let statement = query.select_statement(columns)?;
        executor::fetch_optional(conn, self.db.listeners(), statement).await
    }

    pub async fn count(&self) -> DbResult<u64> {
        let statement = self.count_statement()?;
        let mut conn = self.db.acquire().await?;
        let count = executor::fetch_scalar(&mut conn, self.db.listeners(), statement).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    pub async fn exists(&self) -> DbResult<bool> {
        let statement = self.exists_statement()?;
        let mut conn = self.db.acquire().await?;
        let found = executor::fetch_scalar(&mut conn, self.db.listeners(), statement).await?;
        Ok(found != 0)
    }

    /// Values of `column`, optionally keyed by `key`.
    pub async fn pluck(&self, column: &str, key: Option<&str>) -> DbResult<Plucked> {
        let statement = self.pluck_statement(column, key)?;
        let mut conn = self.db.acquire().await?;
        let records: Vec<Record> =
            executor::fetch_all(&mut conn, self.db.listeners(), statement).await?;
        Ok(Plucked::from_records(records, key.is_some()))
    }

    /// Deletes every matching row and returns how many went.
    pub async fn delete(&self) -> DbResult<u64> {
        let statement = self.delete_statement()?;
        let mut conn = self.db.acquire().await?;
        executor::execute(&mut conn, self.db.listeners(), statement).await
    }

    /// Feeds matching rows to `callback` in pages of `size`.
    ///
    /// Pages are ordered by the primary key (`rowid` for raw queries) unless
    /// the query already has an order. Any limit/offset on the query is
    /// replaced by the paging. Returns `false` when the callback stopped
    /// the scan with `ControlFlow::Break` or `size` is zero.
    pub async fn chunk<F>(&self, size: u64, mut callback: F) -> DbResult<bool>
    where
        F: FnMut(Vec<R>) -> ControlFlow<()> + Send,
    {
        if size == 0 {
            return Ok(false);
        }

        let mut base = self.clone();
        if !base.criteria.has_orders() {
            let key = self.key_column.as_deref().unwrap_or("rowid");
            base.criteria.order_by(key);
        }

        let mut conn = self.db.acquire().await?;
        let mut page: u64 = 0;

        loop {
            // past u64::MAX rows there is nothing left to page through
            let Some(offset) = page.checked_mul(size) else {
                break;
            };
            let mut paged = base.clone();
            paged.criteria.limit(size).offset(offset);
            let statement = paged.select_statement(&Columns::All)?;

            let rows: Vec<R> =
                executor::fetch_all(&mut conn, self.db.listeners(), statement).await?;
            let fetched = rows.len() as u64;

            if fetched == 0 {
                break;
            }

            debug!(table = %self.table, page, rows = fetched, "Processing chunk");

            if callback(rows).is_break() {
                return Ok(false);
            }
            if fetched < size {
                break;
            }
            page += 1;
        }

        Ok(true)
    }
}

impl<E: Entity> Query<E> {
    fn keyed(&self, id: &Value) -> Self {
        let mut query = self.clone();
        query
            .criteria
            .where_eq(format!("{}.{}", E::TABLE, E::PRIMARY_KEY), id.clone());
        query
    }

    /// Row with primary key `id`, if it is in scope.
    pub async fn find(&self, id: impl Into<Value>, columns: &Columns) -> DbResult<Option<E>> {
        let mut conn = self.db.acquire().await?;
        self.find_on(&mut conn, &id.into(), columns).await
    }

    /// Row with primary key `id`, or [`DbError::NotFound`].
    pub async fn find_or_fail(&self, id: impl Into<Value>, columns: &Columns) -> DbResult<E> {
        let id = id.into();
        self.find(id.clone(), columns)
            .await?
            .ok_or_else(|| DbError::not_found(E::entity_name(), id.to_string()))
    }

    pub(crate) async fn find_on(
        &self,
        conn: &mut SqliteConnection,
        id: &Value,
        columns: &Columns,
    ) -> DbResult<Option<E>> {
        self.keyed(id).first_on(conn, columns).await
    }

    /// Updates the first row matching `attributes` with `values`, or inserts
    /// `attributes` merged with `values` when nothing matches.
    ///
    /// Lookup and write share one transaction.
    pub async fn update_or_create(&self, attributes: Attributes, values: Attributes) -> DbResult<E> {
        let mut tx = self.db.begin().await?;

        let lookup = self
            .clone()
            .refine(Some(&Condition::Equality(attributes.clone())), None);
        let found = lookup.first_on(&mut tx, &Columns::All).await?;

        let entity = match found {
            Some(existing) => {
                let key = existing.key();
                model::update_by_key::<E>(
                    &mut tx,
                    self.db.listeners(),
                    &key,
                    &values,
                    &UpdateOptions::default(),
                )
                .await?
                .ok_or_else(|| DbError::not_found(E::entity_name(), key.to_string()))?
            }
            None => {
                let mut merged = attributes;
                merged.extend(values);
                model::insert::<E>(&mut tx, self.db.listeners(), &merged).await?
            }
        };

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(entity)
    }
}
