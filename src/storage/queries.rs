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


//! Database query functions
//!
//! This module implements the catalog store's repository functions.
//!
//! # Query Patterns
//! - One free function per store operation
//! - Every function is generic over `sqlx::Executor`, so the same query runs
//!   against the pool (`db.pool()`) or inside a transaction (`&mut *tx`)
//! - Constraint failures are translated into `CatalogError` here; callers never
//!   inspect driver errors

use crate::error::{CatalogError, Result};
use crate::storage::models::*;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};

// ============================================================================
// BOOK QUERIES
// ============================================================================

/// Insert a new book, initially available
///
/// Fails with `DuplicateKey` if the ISBN is already catalogued.
pub async fn insert_book<'e, E>(executor: E, book: &NewBook) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO books (isbn, title, author, genre, is_available)
        VALUES (?, ?, ?, ?, 1)
        "#,
    )
    .bind(&book.isbn)
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.genre)
    .execute(executor)
    .await
    .map_err(|e| CatalogError::from_insert(e, "book", &book.isbn))?;

    Ok(())
}

/// Find book by ISBN
pub async fn find_book<'e, E>(executor: E, isbn: &str) -> Result<Option<Book>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let book = sqlx::query_as::<_, Book>(
        "SELECT isbn, title, author, genre, is_available FROM books WHERE isbn = ?",
    )
    .bind(isbn)
    .fetch_optional(executor)
    .await?;

    Ok(book)
}

/// List all books ordered by ISBN
pub async fn list_books<'e, E>(executor: E) -> Result<Vec<Book>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let books = sqlx::query_as::<_, Book>(
        "SELECT isbn, title, author, genre, is_available FROM books ORDER BY isbn",
    )
    .fetch_all(executor)
    .await?;

    Ok(books)
}

/// Set the availability flag of a book
///
/// Setting a flag to the value it already has is not an error.
/// Fails with `NotFound` if the ISBN is unknown.
pub async fn set_book_availability<'e, E>(executor: E, isbn: &str, available: bool) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE books SET is_available = ? WHERE isbn = ?")
        .bind(available)
        .bind(isbn)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CatalogError::book_not_found(isbn));
    }

    Ok(())
}

// ============================================================================
// USER QUERIES
// ============================================================================

/// Insert a new user
///
/// Fails with `DuplicateKey` if the user ID is taken; the existing row is untouched.
pub async fn insert_user<'e, E>(executor: E, user: &NewUser) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO users (user_id, name, contact) VALUES (?, ?, ?)")
        .bind(&user.user_id)
        .bind(&user.name)
        .bind(&user.contact)
        .execute(executor)
        .await
        .map_err(|e| CatalogError::from_insert(e, "user", &user.user_id))?;

    Ok(())
}

/// Find user by ID
pub async fn find_user<'e, E>(executor: E, user_id: &str) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(
        "SELECT user_id, name, contact FROM users WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// List all registered users ordered by ID
pub async fn list_users<'e, E>(executor: E) -> Result<Vec<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let users = sqlx::query_as::<_, User>("SELECT user_id, name, contact FROM users ORDER BY user_id")
        .fetch_all(executor)
        .await?;

    Ok(users)
}

// ============================================================================
// BORROWING QUERIES
// ============================================================================

/// Count a user's active borrows (records without a return date)
pub async fn count_active_borrows<'e, E>(executor: E, user_id: &str) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM borrowings WHERE user_id = ? AND return_date IS NULL",
    )
    .bind(user_id)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

/// Insert an active borrow record
///
/// Returns the id assigned by the store.
pub async fn insert_borrow_record<'e, E>(
    executor: E,
    user_id: &str,
    isbn: &str,
    borrow_date: DateTime<Utc>,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO borrowings (user_id, isbn, borrow_date, return_date) VALUES (?, ?, ?, NULL)",
    )
    .bind(user_id)
    .bind(isbn)
    .bind(borrow_date)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Find the most recent active borrow of a book by a user
///
/// Ordered by borrow date descending; equal dates fall back to the newer id.
pub async fn find_latest_active_borrow<'e, E>(
    executor: E,
    user_id: &str,
    isbn: &str,
) -> Result<Option<BorrowRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let record = sqlx::query_as::<_, BorrowRecord>(
        r#"
        SELECT id, user_id, isbn, borrow_date, return_date
        FROM borrowings
        WHERE user_id = ? AND isbn = ? AND return_date IS NULL
        ORDER BY borrow_date DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(isbn)
    .fetch_optional(executor)
    .await?;

    Ok(record)
}

/// Close an active borrow record by setting its return date
///
/// Fails with `NotFound` if no active record has this id, so a record can
/// only ever be closed once.
pub async fn close_borrow_record<'e, E>(executor: E, id: i64, return_date: DateTime<Utc>) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE borrowings SET return_date = ? WHERE id = ? AND return_date IS NULL",
    )
    .bind(return_date)
    .bind(id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CatalogError::NotFound {
            entity: "borrow record",
            key: id.to_string(),
        });
    }

    Ok(())
}

/// Books currently borrowed by a user (joined through active borrow records)
pub async fn find_active_borrows_for_user<'e, E>(executor: E, user_id: &str) -> Result<Vec<Book>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let books = sqlx::query_as::<_, Book>(
        r#"
        SELECT b.isbn, b.title, b.author, b.genre, b.is_available
        FROM books b
        JOIN borrowings br ON b.isbn = br.isbn
        WHERE br.user_id = ? AND br.return_date IS NULL
        ORDER BY br.borrow_date, br.id
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;

    Ok(books)
}

/// Full borrow history of a user, newest first
pub async fn borrow_history_for_user<'e, E>(executor: E, user_id: &str) -> Result<Vec<BorrowRecord>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let records = sqlx::query_as::<_, BorrowRecord>(
        r#"
        SELECT id, user_id, isbn, borrow_date, return_date
        FROM borrowings
        WHERE user_id = ?
        ORDER BY borrow_date DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;

    Ok(records)
}

// ============================================================================
// TRANSACTION HELPERS
// ============================================================================

/// Take SQLite's write lock as the first statement of a transaction
///
/// sqlx opens deferred transactions, which only lock on the first write. A
/// no-op write up front makes the whole read-check-write sequence run under
/// the lock, so two lending transactions can never interleave. Contending
/// writers wait for the connection's busy timeout.
pub async fn claim_write_lock<'e, E>(executor: E) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE books SET is_available = is_available WHERE 0")
        .execute(executor)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;

    async fn seeded() -> Database {
        let db = Database::new_in_memory().await.expect("Failed to create database");
        insert_book(
            db.pool(),
            &NewBook::new("978-1".to_string(), "Dune".to_string(), "Frank Herbert".to_string()),
        )
        .await
        .expect("Failed to insert book");
        insert_user(db.pool(), &NewUser::new("U1".to_string(), "Ann".to_string()))
            .await
            .expect("Failed to insert user");
        db
    }

    #[tokio::test]
    async fn test_insert_and_find_book() {
        let db = seeded().await;

        let book = find_book(db.pool(), "978-1")
            .await
            .expect("Failed to find book")
            .expect("Book missing");

        assert_eq!(book.title, "Dune");
        assert!(book.is_available);
        assert_eq!(book.genre, None);
    }

    #[tokio::test]
    async fn test_duplicate_book_is_rejected() {
        let db = seeded().await;

        let err = insert_book(
            db.pool(),
            &NewBook::new("978-1".to_string(), "Other".to_string(), "Someone".to_string()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CatalogError::DuplicateKey { entity: "book", .. }));
        assert_eq!(list_books(db.pool()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_availability_unknown_isbn() {
        let db = seeded().await;

        let err = set_book_availability(db.pool(), "missing", false).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { entity: "book", .. }));
    }

    #[tokio::test]
    async fn test_borrow_record_lifecycle() {
        let db = seeded().await;
        let borrowed_at = Utc::now();

        let id = insert_borrow_record(db.pool(), "U1", "978-1", borrowed_at)
            .await
            .expect("Failed to insert borrow record");
        assert_eq!(count_active_borrows(db.pool(), "U1").await.unwrap(), 1);

        let active = find_latest_active_borrow(db.pool(), "U1", "978-1")
            .await
            .unwrap()
            .expect("Active borrow missing");
        assert_eq!(active.id, id);
        assert!(active.is_active());

        close_borrow_record(db.pool(), id, Utc::now()).await.unwrap();
        assert_eq!(count_active_borrows(db.pool(), "U1").await.unwrap(), 0);
        assert!(find_latest_active_borrow(db.pool(), "U1", "978-1").await.unwrap().is_none());

        // A closed record cannot be closed again
        let err = close_borrow_record(db.pool(), id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));

        let history = borrow_history_for_user(db.pool(), "U1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].return_date.is_some());
    }

    #[tokio::test]
    async fn test_latest_active_borrow_prefers_newest() {
        let db = seeded().await;
        let earlier = Utc::now() - chrono::Duration::hours(1);

        let old_id = insert_borrow_record(db.pool(), "U1", "978-1", earlier).await.unwrap();
        let new_id = insert_borrow_record(db.pool(), "U1", "978-1", Utc::now()).await.unwrap();
        assert!(new_id > old_id);

        let latest = find_latest_active_borrow(db.pool(), "U1", "978-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, new_id);
    }

    #[tokio::test]
    async fn test_active_borrows_join() {
        let db = seeded().await;
        insert_book(
            db.pool(),
            &NewBook::new("978-2".to_string(), "Emma".to_string(), "Jane Austen".to_string()),
        )
        .await
        .unwrap();

        insert_borrow_record(db.pool(), "U1", "978-2", Utc::now()).await.unwrap();

        let books = find_active_borrows_for_user(db.pool(), "U1").await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].isbn, "978-2");
        assert!(find_active_borrows_for_user(db.pool(), "nobody").await.unwrap().is_empty());
    }
}
