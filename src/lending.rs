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


//! Lending engine
//!
//! Borrow and return as all-or-nothing operations over the catalog store.
//!
//! # Invariants
//! - A user holds at most `borrow_limit` active borrows (5 by default)
//! - A book is unavailable exactly while one active borrow references it
//! - Each borrow record is closed at most once
//!
//! Every step of an operation runs inside one transaction. Any failure rolls
//! the transaction back, so the book flag, the borrow count and the history
//! always move together.

use crate::error::{CatalogError, Result};
use crate::storage::{queries, BorrowRecord, Database};
use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, Transaction};

/// Maximum simultaneous active borrows per user
pub const DEFAULT_BORROW_LIMIT: i64 = 5;

/// Rules applied by the lending engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingPolicy {
    pub borrow_limit: i64,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            borrow_limit: DEFAULT_BORROW_LIMIT,
        }
    }
}

/// Runs borrow/return transactions against a catalog database
#[derive(Debug, Clone)]
pub struct LendingEngine {
    db: Database,
    policy: LendingPolicy,
}

impl LendingEngine {
    pub fn new(db: Database) -> Self {
        Self::with_policy(db, LendingPolicy::default())
    }

    pub fn with_policy(db: Database, policy: LendingPolicy) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> LendingPolicy {
        self.policy
    }

    /// Borrow a book for a user
    ///
    /// Steps, all inside one transaction:
    /// 1. Reject with `BorrowLimitExceeded` if the user already has
    ///    `borrow_limit` active borrows
    /// 2. Reject with `NotFound` for an unknown user or book, and with
    ///    `BookUnavailable` if the book is already out
    /// 3. Insert the borrow record (borrow date = now)
    /// 4. Mark the book unavailable
    ///
    /// Returns the new active record.
    pub async fn borrow(&self, user_id: &str, isbn: &str) -> Result<BorrowRecord> {
        let user_id = required_key("user_id", user_id)?;
        let isbn = required_key("isbn", isbn)?;

        let mut tx = self.db.begin().await.map_err(|e| {
            log_failure("borrow", user_id, isbn, &e);
            e
        })?;
        match borrow_steps(&mut *tx, self.policy, user_id, isbn).await {
            Ok(record) => {
                tx.commit()
                    .await
                    .map_err(|e| committed_failure("borrow", user_id, isbn, e))?;
                tracing::info!(user_id, isbn, borrow_id = record.id, "Book borrowed");
                Ok(record)
            }
            Err(e) => {
                rollback(tx, "borrow").await;
                log_failure("borrow", user_id, isbn, &e);
                Err(e)
            }
        }
    }

    /// Return a borrowed book
    ///
    /// Steps, all inside one transaction:
    /// 1. Find the user's latest active borrow of the book, or fail with
    ///    `NoActiveBorrow`
    /// 2. Set its return date to now
    /// 3. Mark the book available
    ///
    /// Returns the closed record.
    pub async fn return_book(&self, user_id: &str, isbn: &str) -> Result<BorrowRecord> {
        let user_id = required_key("user_id", user_id)?;
        let isbn = required_key("isbn", isbn)?;

        let mut tx = self.db.begin().await.map_err(|e| {
            log_failure("return", user_id, isbn, &e);
            e
        })?;
        match return_steps(&mut *tx, user_id, isbn).await {
            Ok(record) => {
                tx.commit()
                    .await
                    .map_err(|e| committed_failure("return", user_id, isbn, e))?;
                tracing::info!(user_id, isbn, borrow_id = record.id, "Book returned");
                Ok(record)
            }
            Err(e) => {
                rollback(tx, "return").await;
                log_failure("return", user_id, isbn, &e);
                Err(e)
            }
        }
    }
}

async fn borrow_steps(
    conn: &mut SqliteConnection,
    policy: LendingPolicy,
    user_id: &str,
    isbn: &str,
) -> Result<BorrowRecord> {
    queries::claim_write_lock(&mut *conn).await?;

    let active = queries::count_active_borrows(&mut *conn, user_id).await?;
    if active >= policy.borrow_limit {
        return Err(CatalogError::BorrowLimitExceeded {
            user_id: user_id.to_string(),
            limit: policy.borrow_limit,
        });
    }

    if queries::find_user(&mut *conn, user_id).await?.is_none() {
        return Err(CatalogError::user_not_found(user_id));
    }

    let book = queries::find_book(&mut *conn, isbn)
        .await?
        .ok_or_else(|| CatalogError::book_not_found(isbn))?;
    if !book.is_available {
        return Err(CatalogError::BookUnavailable {
            isbn: isbn.to_string(),
        });
    }

    let borrow_date = Utc::now();
    let id = queries::insert_borrow_record(&mut *conn, user_id, isbn, borrow_date).await?;
    queries::set_book_availability(&mut *conn, isbn, false).await?;

    Ok(BorrowRecord {
        id,
        user_id: user_id.to_string(),
        isbn: isbn.to_string(),
        borrow_date,
        return_date: None,
    })
}

async fn return_steps(conn: &mut SqliteConnection, user_id: &str, isbn: &str) -> Result<BorrowRecord> {
    queries::claim_write_lock(&mut *conn).await?;

    let mut record = queries::find_latest_active_borrow(&mut *conn, user_id, isbn)
        .await?
        .ok_or_else(|| CatalogError::NoActiveBorrow {
            user_id: user_id.to_string(),
            isbn: isbn.to_string(),
        })?;

    let return_date = Utc::now();
    queries::close_borrow_record(&mut *conn, record.id, return_date).await?;
    queries::set_book_availability(&mut *conn, isbn, true).await?;

    record.return_date = Some(return_date);
    Ok(record)
}

fn required_key<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::invalid_input(format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}

async fn rollback(tx: Transaction<'static, Sqlite>, operation: &'static str) {
    // The connection discards the transaction on drop if this fails too.
    if let Err(e) = tx.rollback().await {
        tracing::error!(operation, error = %e, "Rollback failed");
    }
}

fn committed_failure(operation: &'static str, user_id: &str, isbn: &str, err: sqlx::Error) -> CatalogError {
    let err = CatalogError::from(err);
    log_failure(operation, user_id, isbn, &err);
    err
}

fn log_failure(operation: &'static str, user_id: &str, isbn: &str, err: &CatalogError) {
    if err.is_rule_violation() {
        tracing::warn!(operation, user_id, isbn, error = %err, "Lending request rejected");
    } else {
        tracing::error!(operation, user_id, isbn, error = %err, "Lending transaction failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewBook, NewUser};

    async fn setup(books: usize) -> (Database, LendingEngine) {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        queries::insert_user(db.pool(), &NewUser::new("U1".to_string(), "Ann".to_string()))
            .await
            .expect("Failed to insert user");
        for i in 1..=books {
            queries::insert_book(
                db.pool(),
                &NewBook::new(format!("978-{}", i), format!("Book {}", i), "Author".to_string()),
            )
            .await
            .expect("Failed to insert book");
        }
        let engine = LendingEngine::new(db.clone());
        (db, engine)
    }

    async fn record_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM borrowings")
            .fetch_one(db.pool())
            .await
            .expect("Failed to count borrowings")
    }

    #[tokio::test]
    async fn test_borrow_marks_book_unavailable() {
        let (db, engine) = setup(1).await;

        let record = engine.borrow("U1", "978-1").await.expect("Borrow failed");
        assert!(record.is_active());
        assert_eq!(record.isbn, "978-1");

        let book = queries::find_book(db.pool(), "978-1").await.unwrap().unwrap();
        assert!(!book.is_available);
        assert_eq!(queries::count_active_borrows(db.pool(), "U1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sixth_borrow_hits_limit() {
        let (db, engine) = setup(6).await;

        for i in 1..=5 {
            engine.borrow("U1", &format!("978-{}", i)).await.expect("Borrow failed");
        }

        let err = engine.borrow("U1", "978-6").await.unwrap_err();
        assert!(matches!(err, CatalogError::BorrowLimitExceeded { limit: 5, .. }));
        assert_eq!(record_count(&db).await, 5);

        let sixth = queries::find_book(db.pool(), "978-6").await.unwrap().unwrap();
        assert!(sixth.is_available);
    }

    #[tokio::test]
    async fn test_unknown_book_leaves_no_record() {
        let (db, engine) = setup(0).await;

        let err = engine.borrow("U1", "missing").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { entity: "book", .. }));
        assert_eq!(record_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let (db, engine) = setup(1).await;

        let err = engine.borrow("ghost", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { entity: "user", .. }));
        assert_eq!(record_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_borrowing_unavailable_book_is_rejected() {
        let (db, engine) = setup(1).await;
        queries::insert_user(db.pool(), &NewUser::new("U2".to_string(), "Bob".to_string()))
            .await
            .unwrap();

        engine.borrow("U1", "978-1").await.expect("First borrow failed");

        let err = engine.borrow("U2", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::BookUnavailable { .. }));

        // Same user twice is rejected too: one active record per pair
        let err = engine.borrow("U1", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::BookUnavailable { .. }));
        assert_eq!(record_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_return_restores_availability() {
        let (db, engine) = setup(1).await;

        let borrowed = engine.borrow("U1", "978-1").await.unwrap();
        let returned = engine.return_book("U1", "978-1").await.expect("Return failed");

        assert_eq!(borrowed.id, returned.id);
        assert!(returned.return_date.is_some());

        let book = queries::find_book(db.pool(), "978-1").await.unwrap().unwrap();
        assert!(book.is_available);
        assert_eq!(queries::count_active_borrows(db.pool(), "U1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_return_without_borrow_fails() {
        let (db, engine) = setup(1).await;

        let err = engine.return_book("U1", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::NoActiveBorrow { .. }));

        let book = queries::find_book(db.pool(), "978-1").await.unwrap().unwrap();
        assert!(book.is_available);
        assert_eq!(record_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_custom_limit() {
        let (db, _) = setup(2).await;
        let engine = LendingEngine::with_policy(db, LendingPolicy { borrow_limit: 1 });

        engine.borrow("U1", "978-1").await.unwrap();
        let err = engine.borrow("U1", "978-2").await.unwrap_err();
        assert!(matches!(err, CatalogError::BorrowLimitExceeded { limit: 1, .. }));
    }

    #[tokio::test]
    async fn test_blank_keys_are_invalid_input() {
        let (_db, engine) = setup(1).await;

        let err = engine.borrow("  ", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput(_)));
        let err = engine.return_book("U1", "").await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidInput(_)));
    }
    async fn block_availability_change(db: &Database, to: bool) {
        let sql = format!(
            "CREATE TRIGGER block_availability BEFORE UPDATE OF is_available ON books \
             WHEN NEW.is_available = {} \
             BEGIN SELECT RAISE(ABORT, 'availability change blocked'); END",
            i32::from(to)
        );
        sqlx::query(&sql)
            .execute(db.pool())
            .await
            .expect("Failed to create trigger");
    }

    #[tokio::test]
    async fn test_failed_borrow_undoes_inserted_record() {
        let (db, engine) = setup(1).await;
        block_availability_change(&db, false).await;

        // The record insert succeeds, then marking the book out aborts
        let err = engine.borrow("U1", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)));

        assert_eq!(record_count(&db).await, 0);
        assert_eq!(queries::count_active_borrows(db.pool(), "U1").await.unwrap(), 0);
        let book = queries::find_book(db.pool(), "978-1").await.unwrap().unwrap();
        assert!(book.is_available);
    }

    #[tokio::test]
    async fn test_failed_return_keeps_record_open() {
        let (db, engine) = setup(1).await;
        let borrowed = engine.borrow("U1", "978-1").await.unwrap();
        block_availability_change(&db, true).await;

        // The record is closed, then marking the book available aborts
        let err = engine.return_book("U1", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)));

        let active = queries::find_latest_active_borrow(db.pool(), "U1", "978-1")
            .await
            .unwrap()
            .expect("Borrow should still be active");
        assert_eq!(active.id, borrowed.id);
        assert!(active.return_date.is_none());

        let book = queries::find_book(db.pool(), "978-1").await.unwrap().unwrap();
        assert!(!book.is_available);
    }

    #[tokio::test]
    async fn test_closed_store_is_unavailable() {
        let (db, engine) = setup(1).await;
        db.clone().close().await.unwrap();

        let err = engine.borrow("U1", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
        let err = engine.return_book("U1", "978-1").await.unwrap_err();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
    }
}
