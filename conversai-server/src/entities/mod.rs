//! Persistence layer.
//!
//! [`ChatStore`] defines the interface for chat documents.  The default
//! implementation is [`SqliteStore`], which keeps one row per chat with the
//! message and version lists in JSON columns.
//!
//! Trait methods use `impl Future` in their signatures so no `async-trait`
//! boxing is needed on this path.

pub mod chat;
pub mod dao;

pub use chat::ChatStore;
pub use dao::{Chat, Role, StoredMessage};

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

/// Errors surfaced by [`ChatStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The chat, message or version addressed by the caller does not exist.
    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL, e.g. `"sqlite://conversai.db"`.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, running migrations on it first.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Fresh private in-memory database.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }
}
