//! Database manager
//!
//! Owns the r2d2 pool of SQLite connections and runs synchronous rusqlite
//! work on the blocking thread pool so request tasks never block the runtime.

use crate::core::error::{AppError, ErrorContext, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tokio::task;

/// Database manager with connection pool
#[derive(Clone)]
pub struct DatabaseManager {
    pool: Pool<SqliteConnectionManager>,
}

impl DatabaseManager {
    /// Open (or create) the database file and bring the schema up to date
    pub fn new(db_path: &Path, pool_size: u32, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context(format!(
                    "Failed to create database directory {}",
                    parent.display()
                ))?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(Duration::from_secs(30))
            .build(manager)
            .map_err(|e| AppError::PoolError(e.to_string()))?;

        let manager = Self { pool };
        manager.migrate()?;

        tracing::debug!(path = %db_path.display(), pool_size, "Database pool ready");

        Ok(manager)
    }

    /// In-memory database with the schema applied, for tests
    pub fn new_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        // every pooled connection to :memory: is a separate database
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(Duration::from_secs(30))
            .build(manager)
            .map_err(|e| AppError::PoolError(e.to_string()))?;

        let manager = Self { pool };
        manager.migrate()?;

        Ok(manager)
    }

    pub fn get_connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::PoolError(e.to_string()))
    }

    /// Run `f` against a pooled connection on the blocking pool
    pub async fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();

        task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| AppError::PoolError(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::TaskError(format!("Database task panicked: {}", e)))?
    }

    /// Run `f` inside a transaction; committed on `Ok`, rolled back on `Err`
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();

        task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| AppError::PoolError(e.to_string()))?;

            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;

            Ok(result)
        })
        .await
        .map_err(|e| AppError::TaskError(format!("Transaction task panicked: {}", e)))?
    }

    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.get_connection()?;
        crate::db::migrations::run_migrations(&mut conn)
    }

    pub fn pool_size(&self) -> u32 {
        self.pool.max_size()
    }
}
