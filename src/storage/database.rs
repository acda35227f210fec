// Library Core - Library catalog and lending manager
// Copyright (C) 2025 Library Core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Database connection and management
//!
//! This module handles database connection pooling, initialization, and the
//! scoped transactions the lending engine runs in.
//!
//! # Database Location
//! - Desktop (macOS): ~/Library/Application Support/LibraryCore/catalog.db
//! - Desktop (Linux): ~/.local/share/LibraryCore/catalog.db
//! - Desktop (Windows): %APPDATA%/LibraryCore/catalog.db
//! - Overridden by `LIBRARY_DATABASE_PATH` (see `config`)
//!
//! # SQLite Configuration
//! - WAL mode for better concurrency
//! - Foreign keys enabled
//! - Normal synchronous mode (balance safety/speed)
//! - Busy timeout so contending writers wait instead of failing

use crate::config::LibraryConfig;
use crate::error::{CatalogError, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    ConnectOptions, Sqlite, Transaction,
};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Database manager - handles connection pooling and operations
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: Option<PathBuf>, // None for in-memory databases
}

impl Database {
    /// Create new database connection with migrations
    ///
    /// # Arguments
    /// * `database_path` - Path to SQLite database file (will be created if doesn't exist)
    ///
    /// # Errors
    /// Returns error if:
    /// - Parent directory doesn't exist and can't be created
    /// - Database file can't be opened
    /// - Migrations fail
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        Self::open(database_path.as_ref(), DEFAULT_MAX_CONNECTIONS, DEFAULT_BUSY_TIMEOUT).await
    }

    /// Create database from loaded configuration
    pub async fn from_config(config: &LibraryConfig) -> Result<Self> {
        Self::open(&config.database_path, config.max_connections, config.busy_timeout).await
    }

    async fn open(path: &Path, max_connections: u32, busy_timeout: Duration) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CatalogError::StoreUnavailable(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let connect_opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(busy_timeout)
            .connect_with(connect_opts)
            .await?;

        let db = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        db.migrate().await?;

        tracing::info!(path = %path.display(), max_connections, "Opened catalog database");

        Ok(db)
    }

    /// Create in-memory database for testing
    ///
    /// Uses a single connection that never expires; the data lives exactly as
    /// long as that connection.
    ///
    /// # Errors
    /// Returns error if database creation or migration fails
    pub async fn new_in_memory() -> Result<Self> {
        let connect_opts = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_opts)
            .await?;

        let db = Self { pool, path: None };
        db.migrate().await?;

        Ok(db)
    }

    /// Run database migrations
    ///
    /// Migrations are run automatically when creating a new database connection.
    pub async fn migrate(&self) -> Result<()> {
        crate::storage::migrations::run_migrations(&self.pool)
            .await
            .map_err(|e| CatalogError::MigrationFailed(e.to_string()))?;

        Ok(())
    }

    /// Open a scoped transaction
    ///
    /// Effects become visible only on `commit()`. Dropping the transaction or
    /// calling `rollback()` undoes everything done through it.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Get reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database file path
    ///
    /// Returns `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close database and release all connections
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    /// Verify the store is reachable
    ///
    /// Any failure is reported as `StoreUnavailable`.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CatalogError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Check database integrity
    ///
    /// Runs SQLite integrity check and returns true if database is okay.
    pub async fn check_integrity(&self) -> Result<bool> {
        let result: String = sqlx::query_scalar("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await?;

        Ok(result == "ok")
    }

    /// Get default database path for the platform
    pub fn get_default_path() -> PathBuf {
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("LibraryCore")
                .join("catalog.db")
        }

        #[cfg(target_os = "linux")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("LibraryCore")
                .join("catalog.db")
        }

        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(appdata).join("LibraryCore").join("catalog.db")
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            PathBuf::from("./catalog.db")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{models::NewBook, queries};

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new_in_memory().await.expect("Failed to create in-memory database");

        let result: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(db.pool())
            .await
            .expect("Failed to query database");

        assert_eq!(result, 1);
        assert!(db.path().is_none());
        db.health_check().await.expect("Health check failed");
    }

    #[tokio::test]
    async fn test_integrity_check() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        let is_ok = db.check_integrity().await.expect("Failed to check integrity");

        assert!(is_ok, "Database integrity check failed");
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        {
            let mut tx = db.begin().await.expect("Failed to begin");
            queries::insert_book(
                &mut *tx,
                &NewBook::new("978-1".to_string(), "Dune".to_string(), "Frank Herbert".to_string()),
            )
            .await
            .expect("Failed to insert inside transaction");
            // dropped without commit
        }

        let books = queries::list_books(db.pool()).await.expect("Failed to list books");
        assert!(books.is_empty());
    }

    #[tokio::test]
    async fn test_committed_transaction_is_visible() {
        let db = Database::new_in_memory().await.expect("Failed to create database");

        let mut tx = db.begin().await.expect("Failed to begin");
        queries::insert_book(
            &mut *tx,
            &NewBook::new("978-1".to_string(), "Dune".to_string(), "Frank Herbert".to_string()),
        )
        .await
        .expect("Failed to insert inside transaction");
        tx.commit().await.expect("Failed to commit");

        assert_eq!(queries::list_books(db.pool()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_is_store_unavailable() {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        db.pool().close().await;

        let err = db.health_check().await.unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));

        let err = queries::list_books(db.pool()).await.unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
    }
}
