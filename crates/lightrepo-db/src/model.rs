//! # Entities
//!
//! The [`Entity`] trait describes one table-backed record type, and the
//! `pub(crate)` functions here perform the single-row writes the repository
//! delegates to: insert, update-by-key and delete-by-key.
//!
//! ## Implementing an Entity
//! ```rust,ignore
//! #[derive(Debug, sqlx::FromRow)]
//! struct Note {
//!     id: i64,
//!     title: String,
//! }
//!
//! impl Entity for Note {
//!     const TABLE: &'static str = "notes";
//!
//!     fn key(&self) -> Value {
//!         Value::Int(self.id)
//!     }
//! }
//! ```
//!
//! Writes return the stored row (`RETURNING *`), so generated keys and
//! column defaults are visible on the returned entity.

use chrono::Utc;
use lightrepo_core::validation::{quote_table, validate_identifier};
use lightrepo_core::{Attributes, Value};
use sqlx::SqliteConnection;

use crate::error::{DbError, DbResult};
use crate::executor::{self, FetchRow, Statement};
use crate::listener::QueryListeners;

/// A record type stored in one table.
pub trait Entity: FetchRow + Sized + 'static {
    const TABLE: &'static str;

    const PRIMARY_KEY: &'static str = "id";

    /// Maintain `CREATED_AT` / `UPDATED_AT` on writes.
    const TIMESTAMPS: bool = false;

    const CREATED_AT: &'static str = "created_at";

    const UPDATED_AT: &'static str = "updated_at";

    /// Primary-key value of this instance.
    fn key(&self) -> Value;

    /// Short type name used in error messages.
    ///
    /// Generic arguments are dropped, so `Tagged<app::User>` reports
    /// `Tagged`. Override this when instantiations need telling apart.
    fn entity_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Options for [`Repository::update`](crate::Repository::update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Refresh `UPDATED_AT` on timestamped entities.
    pub touch: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions { touch: true }
    }
}

fn quote_field(column: &str) -> DbResult<String> {
    validate_identifier(column)?;
    Ok(format!("\"{}\"", column))
}

/// Appends ` WHERE "<pk>" = ?` bound to `key`.
fn push_key_predicate<E: Entity>(stmt: &mut Statement, key: &Value) -> DbResult<()> {
    stmt.push(format!(" WHERE {} = ", quote_field(E::PRIMARY_KEY)?))
        .push_bind(key.clone());
    Ok(())
}

fn push_set_prefix(stmt: &mut Statement, first: &mut bool) {
    if *first {
        *first = false;
    } else {
        stmt.push(", ");
    }
}

/// Inserts one row and returns it as stored.
pub(crate) async fn insert<E: Entity>(
    conn: &mut SqliteConnection,
    listeners: &QueryListeners,
    data: &Attributes,
) -> DbResult<E> {
    let mut data = data.clone();
    if E::TIMESTAMPS {
        let now = Value::from(Utc::now());
        data.entry(E::CREATED_AT.to_string())
            .or_insert_with(|| now.clone());
        data.entry(E::UPDATED_AT.to_string()).or_insert(now);
    }

    let mut statement = Statement::new("INSERT INTO ");
    statement.push(quote_table(E::TABLE)?);

    if data.is_empty() {
        statement.push(" DEFAULT VALUES RETURNING *");
    } else {
        let columns = data
            .keys()
            .map(|c| quote_field(c))
            .collect::<DbResult<Vec<_>>>()?;
        let values: Vec<Value> = data.into_values().collect();

        statement
            .push(" (")
            .push_list(columns)
            .push(") VALUES (")
            .push_bind_list(&values)
            .push(") RETURNING *");
    }

    executor::fetch_optional(conn, listeners, statement)
        .await?
        .ok_or_else(|| DbError::Internal(format!("insert into {} returned no row", E::TABLE)))
}

/// Updates the row with primary key `key` and returns it as stored.
///
/// Empty `data` writes nothing and returns the current row. `Ok(None)` when
/// no row has that key.
pub(crate) async fn update_by_key<E: Entity>(
    conn: &mut SqliteConnection,
    listeners: &QueryListeners,
    key: &Value,
    data: &Attributes,
    options: &UpdateOptions,
) -> DbResult<Option<E>> {
    let table = quote_table(E::TABLE)?;

    if data.is_empty() {
        let mut statement = Statement::new("SELECT * FROM ");
        statement.push(table);
        push_key_predicate::<E>(&mut statement, key)?;
        statement.push(" LIMIT 1");
        return executor::fetch_optional(conn, listeners, statement).await;
    }

    let mut data = data.clone();
    if E::TIMESTAMPS && options.touch {
        data.entry(E::UPDATED_AT.to_string())
            .or_insert_with(|| Value::from(Utc::now()));
    }

    let mut statement = Statement::new("UPDATE ");
    statement.push(table).push(" SET ");

    let mut first = true;
    for (column, value) in data {
        push_set_prefix(&mut statement, &mut first);
        statement
            .push(format!("{} = ", quote_field(&column)?))
            .push_bind(value);
    }

    push_key_predicate::<E>(&mut statement, key)?;
    statement.push(" RETURNING *");

    executor::fetch_optional(conn, listeners, statement).await
}

/// Deletes the row with primary key `key`. Returns whether a row went.
pub(crate) async fn delete_by_key<E: Entity>(
    conn: &mut SqliteConnection,
    listeners: &QueryListeners,
    key: &Value,
) -> DbResult<bool> {
    let mut statement = Statement::new("DELETE FROM ");
    statement.push(quote_table(E::TABLE)?);
    push_key_predicate::<E>(&mut statement, key)?;

    Ok(executor::execute(conn, listeners, statement).await? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_db, Post, User};
    use lightrepo_core::attributes;

    #[test]
    fn test_entity_name_is_short_type_name() {
        assert_eq!(User::entity_name(), "User");
        assert_eq!(Post::entity_name(), "Post");
    }

    #[test]
    fn test_short_type_name_drops_generic_arguments() {
        assert_eq!(short_type_name("app::model::User"), "User");
        assert_eq!(short_type_name("app::Tagged<app::model::User>"), "Tagged");
        assert_eq!(
            short_type_name("app::Pair<app::A, std::vec::Vec<app::B>>"),
            "Pair"
        );
        assert_eq!(short_type_name("User"), "User");
    }

    #[tokio::test]
    async fn test_write_statements_are_reported_with_bindings() {
        let db = test_db().await;
        let mut conn = db.acquire().await.unwrap();
        let collector = crate::listener::QueryCollector::attach(db.listeners());

        let user: User = insert(&mut conn, db.listeners(), &attributes! { "name" => "ada" })
            .await
            .unwrap();
        update_by_key::<User>(
            &mut conn,
            db.listeners(),
            &user.key(),
            &attributes! { "team" => 4, "email" => "a@x" },
            &UpdateOptions::default(),
        )
        .await
        .unwrap();

        let events = collector.finish();
        assert_eq!(
            events[0].sql,
            "INSERT INTO \"users\" (\"name\") VALUES (?) RETURNING *"
        );
        assert_eq!(
            events[1].sql,
            "UPDATE \"users\" SET \"email\" = ?, \"team\" = ? WHERE \"id\" = ? RETURNING *"
        );
        assert_eq!(
            events[1].bindings,
            vec![Value::from("a@x"), Value::Int(4), Value::Int(1)]
        );
    }

    #[tokio::test]
    async fn test_insert_update_delete_by_key() {
        let db = test_db().await;
        let mut conn = db.acquire().await.unwrap();
        let listeners = db.listeners();

        let user: User = insert(
            &mut conn,
            listeners,
            &attributes! { "name" => "ada", "team" => 1 },
        )
        .await
        .unwrap();
        assert_eq!(user.id, 1);
        assert!(user.active);

        let updated: Option<User> = update_by_key(
            &mut conn,
            listeners,
            &user.key(),
            &attributes! { "email" => "ada@example.com" },
            &UpdateOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(updated.unwrap().email.as_deref(), Some("ada@example.com"));

        let missing: Option<User> = update_by_key(
            &mut conn,
            listeners,
            &Value::Int(42),
            &attributes! { "team" => 2 },
            &UpdateOptions::default(),
        )
        .await
        .unwrap();
        assert!(missing.is_none());

        assert!(delete_by_key::<User>(&mut conn, listeners, &user.key())
            .await
            .unwrap());
        assert!(!delete_by_key::<User>(&mut conn, listeners, &user.key())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_bad_column_name_never_reaches_sql() {
        let db = test_db().await;
        let mut conn = db.acquire().await.unwrap();

        let err = insert::<User>(
            &mut conn,
            db.listeners(),
            &attributes! { "name\" = 1; --" => "x" },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DbError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_timestamps_filled_and_touched() {
        let db = test_db().await;
        let mut conn = db.acquire().await.unwrap();
        let listeners = db.listeners();

        let post: Post = insert(&mut conn, listeners, &attributes! { "title" => "a" })
            .await
            .unwrap();
        assert!(!post.created_at.is_empty());
        assert_eq!(post.created_at, post.updated_at);

        let stale = attributes! { "updated_at" => "2000-01-01T00:00:00+00:00" };
        update_by_key::<Post>(&mut conn, listeners, &post.key(), &stale, &UpdateOptions::default())
            .await
            .unwrap();

        let quiet = UpdateOptions { touch: false };
        let kept: Post = update_by_key(
            &mut conn,
            listeners,
            &post.key(),
            &attributes! { "title" => "b" },
            &quiet,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(kept.title, "b");
        assert_eq!(kept.updated_at, "2000-01-01T00:00:00+00:00");

        let touched: Post = update_by_key(
            &mut conn,
            listeners,
            &post.key(),
            &attributes! { "title" => "c" },
            &UpdateOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_ne!(touched.updated_at, "2000-01-01T00:00:00+00:00");
        assert_eq!(touched.created_at, post.created_at);
    }
}
