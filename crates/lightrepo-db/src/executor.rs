//! # Statement Execution
//!
//! Every statement the crate runs goes through one of these functions, so
//! every statement is timed, logged and reported to query listeners the
//! same way.
//!
//! ```text
//! Statement (QueryBuilder + copy of the bound values)
//!       │
//!       ▼
//! build_query_as / build_query_scalar / build ──► sqlx on &mut SqliteConnection
//!       │
//!       ▼
//! debug!(sql, time_ms) ──► QueryListeners::dispatch(QueryEvent)
//! ```
//!
//! Functions take a plain `&mut SqliteConnection` so the same code runs on
//! a pooled connection or inside a transaction.

use std::fmt;
use std::time::Instant;

use chrono::Utc;
use lightrepo_core::{QueryEvent, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

use crate::error::DbResult;
use crate::listener::QueryListeners;

/// Rows a query can be decoded into.
pub trait FetchRow: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {}

impl<T> FetchRow for T where T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {}

/// SQL under construction with `?` placeholders and their bound values.
///
/// Text and arguments live in a [`QueryBuilder`]. The values are also kept
/// as [`Value`]s so query events can report them.
pub struct Statement {
    builder: QueryBuilder<'static, Sqlite>,
    bindings: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Statement {
            builder: QueryBuilder::new(sql),
            bindings: Vec::new(),
        }
    }

    /// Appends SQL text. Never pass user input here.
    pub fn push(&mut self, sql: impl fmt::Display) -> &mut Self {
        self.builder.push(sql);
        self
    }

    /// Appends a `?` placeholder bound to `value`.
    pub fn push_bind(&mut self, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match &value {
            Value::Null => self.builder.push_bind(None::<i64>),
            Value::Bool(v) => self.builder.push_bind(*v),
            Value::Int(v) => self.builder.push_bind(*v),
            Value::Float(v) => self.builder.push_bind(*v),
            Value::Text(v) => self.builder.push_bind(v.clone()),
            Value::Blob(v) => self.builder.push_bind(v.clone()),
        };
        self.bindings.push(value);
        self
    }

    /// Appends `?, ?, …`, one placeholder per value.
    pub fn push_bind_list(&mut self, values: &[Value]) -> &mut Self {
        {
            let mut list = self.builder.separated(", ");
            for value in values {
                match value {
                    Value::Null => list.push_bind(None::<i64>),
                    Value::Bool(v) => list.push_bind(*v),
                    Value::Int(v) => list.push_bind(*v),
                    Value::Float(v) => list.push_bind(*v),
                    Value::Text(v) => list.push_bind(v.clone()),
                    Value::Blob(v) => list.push_bind(v.clone()),
                };
            }
        }
        self.bindings.extend(values.iter().cloned());
        self
    }

    /// Appends already-quoted identifiers separated by commas.
    pub(crate) fn push_list<I, S>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        let mut list = self.builder.separated(", ");
        for item in items {
            list.push(item);
        }
        self
    }

    pub fn sql(&self) -> &str {
        self.builder.sql()
    }

    pub fn bindings(&self) -> &[Value] {
        &self.bindings
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql())
            .field("bindings", &self.bindings)
            .finish()
    }
}

fn report(listeners: &QueryListeners, statement: &Statement, started: Instant) {
    let time_ms = started.elapsed().as_secs_f64() * 1000.0;

    debug!(sql = %statement.sql(), bindings = statement.bindings.len(), time_ms, "Query executed");

    if !listeners.is_empty() {
        listeners.dispatch(&QueryEvent {
            sql: statement.sql().to_string(),
            bindings: statement.bindings.clone(),
            time_ms,
            executed_at: Utc::now(),
        });
    }
}

pub(crate) async fn fetch_all<R: FetchRow>(
    conn: &mut SqliteConnection,
    listeners: &QueryListeners,
    mut statement: Statement,
) -> DbResult<Vec<R>> {
    let started = Instant::now();

    let rows = statement
        .builder
        .build_query_as::<R>()
        .fetch_all(&mut *conn)
        .await?;

    report(listeners, &statement, started);
    Ok(rows)
}

pub(crate) async fn fetch_optional<R: FetchRow>(
    conn: &mut SqliteConnection,
    listeners: &QueryListeners,
    mut statement: Statement,
) -> DbResult<Option<R>> {
    let started = Instant::now();

    let row = statement
        .builder
        .build_query_as::<R>()
        .fetch_optional(&mut *conn)
        .await?;

    report(listeners, &statement, started);
    Ok(row)
}

/// Runs a statement returning a single integer (COUNT, EXISTS).
pub(crate) async fn fetch_scalar(
    conn: &mut SqliteConnection,
    listeners: &QueryListeners,
    mut statement: Statement,
) -> DbResult<i64> {
    let started = Instant::now();

    let value: i64 = statement
        .builder
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await?;

    report(listeners, &statement, started);
    Ok(value)
}

/// Runs a write statement and returns the number of rows affected.
pub(crate) async fn execute(
    conn: &mut SqliteConnection,
    listeners: &QueryListeners,
    mut statement: Statement,
) -> DbResult<u64> {
    let started = Instant::now();

    let result = statement.builder.build().execute(&mut *conn).await?;

    report(listeners, &statement, started);
    Ok(result.rows_affected())
}
