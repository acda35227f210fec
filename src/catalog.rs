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


//! Library service
//!
//! The entry point used by front ends. `Library` wires the catalog store, the
//! lending engine and the read-only `CatalogQueries` together and exposes the
//! operations a front end needs: add a book, register a user, borrow, return,
//! list books, list a user's borrowed books.
//!
//! Nothing here caches store contents; every read goes to the database.

use crate::config::LibraryConfig;
use crate::error::{CatalogError, Result};
use crate::lending::{LendingEngine, LendingPolicy};
use crate::storage::{queries, Book, BorrowRecord, Database, NewBook, NewUser, User};
use serde::{Deserialize, Serialize};

// ============================================================================
// CALLER CONTEXT
// ============================================================================

/// Role of whoever is driving the library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Librarian,
    Member,
}

impl Role {
    /// Librarians maintain the catalog and the user registry
    pub fn can_manage_catalog(&self) -> bool {
        matches!(self, Role::Librarian)
    }
}

/// Who is calling into the library
///
/// Borrowing data is identical for every role; the role only gates catalog
/// maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn librarian<S: Into<String>>(user_id: S) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Librarian,
        }
    }

    pub fn member<S: Into<String>>(user_id: S) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Member,
        }
    }

    fn require_catalog_access(&self, action: &str) -> Result<()> {
        if self.role.can_manage_catalog() {
            Ok(())
        } else {
            Err(CatalogError::PermissionDenied(format!(
                "{} requires a librarian, {} is a member",
                action, self.user_id
            )))
        }
    }
}

// ============================================================================
// QUERY FACADE
// ============================================================================

/// Read-only projections of the catalog
#[derive(Debug, Clone)]
pub struct CatalogQueries {
    db: Database,
}

impl CatalogQueries {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every book in the catalog, ordered by ISBN
    pub async fn all_books(&self) -> Result<Vec<Book>> {
        queries::list_books(self.db.pool()).await
    }

    /// Books the user currently has out
    pub async fn borrowed_books_for(&self, user_id: &str) -> Result<Vec<Book>> {
        queries::find_active_borrows_for_user(self.db.pool(), user_id.trim()).await
    }

    /// Every registered user, ordered by ID
    pub async fn all_users(&self) -> Result<Vec<User>> {
        queries::list_users(self.db.pool()).await
    }

    pub async fn find_book(&self, isbn: &str) -> Result<Option<Book>> {
        queries::find_book(self.db.pool(), isbn.trim()).await
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        queries::find_user(self.db.pool(), user_id.trim()).await
    }

    /// All borrow records of the user, newest first, returned ones included
    pub async fn borrow_history_for(&self, user_id: &str) -> Result<Vec<BorrowRecord>> {
        queries::borrow_history_for_user(self.db.pool(), user_id.trim()).await
    }

    pub async fn active_borrow_count(&self, user_id: &str) -> Result<i64> {
        queries::count_active_borrows(self.db.pool(), user_id.trim()).await
    }
}

// ============================================================================
// LIBRARY SERVICE
// ============================================================================

/// Library catalog service
///
/// Catalog maintenance (`add_book`, `register_user`) requires a librarian.
/// Borrowing and returning are open to any caller acting on an explicit user
/// ID; the caller is recorded in the logs only.
#[derive(Debug, Clone)]
pub struct Library {
    db: Database,
    lending: LendingEngine,
    queries: CatalogQueries,
}

impl Library {
    pub fn new(db: Database) -> Self {
        Self::with_policy(db, LendingPolicy::default())
    }

    pub fn with_policy(db: Database, policy: LendingPolicy) -> Self {
        Self {
            lending: LendingEngine::with_policy(db.clone(), policy),
            queries: CatalogQueries::new(db.clone()),
            db,
        }
    }

    /// Open the configured database and check it is reachable
    pub async fn open(config: &LibraryConfig) -> Result<Self> {
        let db = Database::from_config(config).await?;
        db.health_check().await?;
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn queries(&self) -> &CatalogQueries {
        &self.queries
    }

    pub fn lending(&self) -> &LendingEngine {
        &self.lending
    }

    /// Add a book to the catalog (librarians only)
    ///
    /// The book starts out available. Fails with `DuplicateKey` if the ISBN exists.
    pub async fn add_book(&self, caller: &Caller, book: NewBook) -> Result<Book> {
        caller.require_catalog_access("adding books")?;
        let book = book.validated()?;

        queries::insert_book(self.db.pool(), &book).await?;
        tracing::info!(isbn = %book.isbn, added_by = %caller.user_id, "Book added");

        Ok(Book {
            isbn: book.isbn,
            title: book.title,
            author: book.author,
            genre: book.genre,
            is_available: true,
        })
    }

    /// Register a new user (librarians only)
    ///
    /// Fails with `DuplicateKey` if the user ID is taken.
    pub async fn register_user(&self, caller: &Caller, user: NewUser) -> Result<User> {
        caller.require_catalog_access("registering users")?;
        let user = user.validated()?;

        queries::insert_user(self.db.pool(), &user).await?;
        tracing::info!(user_id = %user.user_id, registered_by = %caller.user_id, "User registered");

        Ok(User {
            user_id: user.user_id,
            name: user.name,
            contact: user.contact,
        })
    }

    /// Borrow a book on behalf of `user_id`
    ///
    /// Any caller may do this; `caller` is only logged.
    pub async fn borrow_book(&self, caller: &Caller, user_id: &str, isbn: &str) -> Result<BorrowRecord> {
        tracing::debug!(caller = %caller.user_id, user_id, isbn, "Borrow requested");
        self.lending.borrow(user_id, isbn).await
    }

    /// Return a book on behalf of `user_id`
    ///
    /// Any caller may do this; `caller` is only logged.
    pub async fn return_book(&self, caller: &Caller, user_id: &str, isbn: &str) -> Result<BorrowRecord> {
        tracing::debug!(caller = %caller.user_id, user_id, isbn, "Return requested");
        self.lending.return_book(user_id, isbn).await
    }

    pub async fn list_books(&self) -> Result<Vec<Book>> {
        self.queries.all_books().await
    }

    pub async fn borrowed_books_for(&self, user_id: &str) -> Result<Vec<Book>> {
        self.queries.borrowed_books_for(user_id).await
    }
}
