//! Document storage with live queries.
//!
//! Rows live in SQLite. Every committed write publishes the [`Topic`] of the
//! collection it touched, and [`Subscription`]s re-read their collection when
//! their topic comes by.

mod subscription;

use std::time::Duration;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use subscription::{LiveQuery, Subscription};

use crate::AppResult;

/// Collections a write can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Rooms,
    Presence(Uuid),
    Messages(Uuid),
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS rooms (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        created_by TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        password TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS active_users (
        room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        name TEXT,
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (room_id, user_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY NOT NULL,
        room_id TEXT NOT NULL REFERENCES rooms(id) ON DELETE CASCADE,
        text TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        user_id TEXT NOT NULL,
        user_name TEXT,
        user_photo TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS messages_by_room ON messages (room_id, created_at)",
];

#[derive(Clone)]
pub struct Store {
    pub(crate) db_pool: SqlitePool,
    changes: broadcast::Sender<Topic>,
}

impl Store {
    pub fn new(db_pool: SqlitePool) -> Store {
        Store {
            db_pool,
            changes: broadcast::channel(256).0,
        }
    }

    pub async fn connect(url: &str) -> AppResult<Store> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect(url)
            .await?;
        Ok(Store::new(db_pool))
    }

    /// A private store that lives as long as the returned handle.
    pub async fn in_memory() -> AppResult<Store> {
        // each in-memory connection is its own database, so keep exactly one alive
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;
        let store = Store::new(db_pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> AppResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.db_pool).await?;
        }
        Ok(())
    }

    pub fn publish(&self, topic: Topic) {
        // nobody listening is fine
        let _ = self.changes.send(topic);
    }

    pub fn subscribe<Q: LiveQuery>(&self, query: Q) -> Subscription<Q> {
        Subscription::new(self.clone(), query, self.changes.subscribe())
    }
}

/// Server timestamp in unix milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| anyhow::anyhow!("stored id {raw:?} is not a uuid: {e}").into())
}
