//! Shared fixtures for unit tests: two entities and an in-memory schema.

use lightrepo_core::Value;
use tracing_subscriber::EnvFilter;

use crate::model::Entity;
use crate::pool::{Database, DbConfig};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub(crate) struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub team: i64,
    pub active: bool,
}

impl Entity for User {
    const TABLE: &'static str = "users";

    fn key(&self) -> Value {
        Value::Int(self.id)
    }
}

/// `users` read through a projection: only `id` and `name` are required.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub(crate) struct UserSummary {
    pub id: i64,
    pub name: String,
    #[sqlx(default)]
    pub email: Option<String>,
    #[sqlx(default)]
    pub team: i64,
    #[sqlx(default)]
    pub active: bool,
}

impl Entity for UserSummary {
    const TABLE: &'static str = "users";

    fn key(&self) -> Value {
        Value::Int(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub(crate) struct Post {
    pub id: i64,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Post {
    const TABLE: &'static str = "posts";
    const TIMESTAMPS: bool = true;

    fn key(&self) -> Value {
        Value::Int(self.id)
    }
}

/// `RUST_LOG=lightrepo_db=debug cargo test` shows every statement.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub(crate) async fn test_db() -> Database {
    init_tracing();

    let db = Database::new(DbConfig::in_memory()).await.unwrap();

    sqlx::query(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            email TEXT,
            team INTEGER NOT NULL DEFAULT 0,
            active BOOLEAN NOT NULL DEFAULT 1
        )",
    )
    .execute(db.pool())
    .await
    .unwrap();

    sqlx::query(
        "CREATE TABLE posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL DEFAULT ''
        )",
    )
    .execute(db.pool())
    .await
    .unwrap();

    db
}

/// ada(1, team 1), bob(2, team 2, inactive), carol(3, team 1), dave(4, team 2)
pub(crate) async fn seed_users(db: &Database) {
    sqlx::query(
        "INSERT INTO users (name, team, active) VALUES
            ('ada', 1, 1), ('bob', 2, 0), ('carol', 1, 1), ('dave', 2, 1)",
    )
    .execute(db.pool())
    .await
    .unwrap();
}
