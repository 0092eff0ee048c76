// src/storage.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::{HistoryConfig, StorageBackend};

/// String key-value storage, the equivalent of the browser's local storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

pub fn open_store(cfg: &HistoryConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match cfg.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::default()),
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(&cfg.sqlite_path)?),
        StorageBackend::Redis => Arc::new(RedisStore::connect(&cfg.redis_url)?),
    };
    Ok(store)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(sqlite_path: &str) -> Result<Self> {
        info!("Initializing SQLite key-value store at {}", sqlite_path);

        let conn = Connection::open(sqlite_path)
            .with_context(|| format!("Failed to open SQLite database at {}", sqlite_path))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            ) WITHOUT ROWID;
            "#,
        )
        .context("Failed to create kv table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = conn.blocking_lock();
            let value = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |r| {
                    r.get(0)
                })
                .optional()?;
            Ok(value)
        })
        .await?
        .context("Failed to execute SQLite query")
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .with_context(|| format!("Failed to write key {}", key))?;
            Ok(())
        })
        .await?
        .context("Failed to execute SQLite operation")?;

        debug!("SQLite key written");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = conn.blocking_lock();
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .with_context(|| format!("Failed to delete key {}", key))?;
            Ok(())
        })
        .await?
        .context("Failed to execute SQLite operation")
    }
}

#[derive(Debug)]
pub struct RedisStore {
    redis: redis::Client,
}

impl RedisStore {
    pub fn connect(redis_url: &str) -> Result<Self> {
        info!("Initializing Redis key-value store at {}", redis_url);

        let redis_client = redis::Client::open(redis_url)
            .with_context(|| format!("Failed to connect to Redis at {}", redis_url))?;

        // Test Redis connection
        let mut test_conn = redis_client.get_connection()?;
        let _: () = redis::cmd("PING").query(&mut test_conn)?;

        Ok(Self {
            redis: redis_client,
        })
    }

    async fn connection(&self) -> Result<redis::aio::Connection> {
        self.redis
            .get_async_connection()
            .await
            .context("Failed to get Redis connection")
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.connection().await?;
        let v: Option<String> = con
            .get(key)
            .await
            .with_context(|| format!("Failed to get Redis key {}", key))?;
        Ok(v)
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut con = self.connection().await?;
        let _: () = con
            .set(key, value)
            .await
            .with_context(|| format!("Failed to set Redis key {}", key))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<()> {
        let mut con = self.connection().await?;
        let _: () = con
            .del(key)
            .await
            .with_context(|| format!("Failed to delete Redis key {}", key))?;
        Ok(())
    }
}
