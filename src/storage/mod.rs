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


//! Catalog store
//!
//! This module handles all database operations using SQLite via sqlx.
//!
//! # Database Schema
//! - books: ISBN-keyed catalog entries with an availability flag
//! - users: registered borrowers
//! - borrowings: borrow/return history, one row per borrow event
//!
//! # Usage Example
//! ```no_run
//! use library_core::storage::{Database, queries, models::NewBook};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./catalog.db").await?;
//!
//! let new_book = NewBook::new(
//!     "978-0441172719".to_string(),
//!     "Dune".to_string(),
//!     "Frank Herbert".to_string(),
//! );
//! queries::insert_book(db.pool(), &new_book).await?;
//!
//! let book = queries::find_book(db.pool(), "978-0441172719").await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

// Re-export commonly used types
pub use database::Database;
pub use models::{Book, BorrowRecord, NewBook, NewUser, User};
