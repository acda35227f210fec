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


//! Database models
//!
//! Rust structs mapping the three catalog tables.
//!
//! # Design Notes
//! - Stored records derive `FromRow` and are read back with `query_as`
//! - `New*` structs carry validated input for inserts
//! - Timestamps are `DateTime<Utc>`, persisted as ISO-8601 text

use crate::error::{CatalogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

// ============================================================================
// ENTITY MODELS
// ============================================================================

/// Book - one physical copy in the catalog
///
/// `is_available` is `false` exactly while an active borrow references the ISBN.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Book {
    /// Primary key
    pub isbn: String,
    pub title: String,
    pub author: String,
    #[sqlx(default)]
    pub genre: Option<String>,
    pub is_available: bool,
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} by {} ({}) - {}",
            self.isbn,
            self.title,
            self.author,
            self.genre.as_deref().unwrap_or("-"),
            if self.is_available { "Available" } else { "Borrowed" }
        )
    }
}

/// Registered library user
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct User {
    /// Primary key
    pub user_id: String,
    pub name: String,
    #[sqlx(default)]
    pub contact: Option<String>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (User ID: {})", self.name, self.user_id)
    }
}

/// One borrow event
///
/// Active while `return_date` is `None`. Closed exactly once, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct BorrowRecord {
    /// Surrogate key (AUTOINCREMENT, never reused)
    pub id: i64,
    pub user_id: String,
    pub isbn: String,
    pub borrow_date: DateTime<Utc>,
    #[sqlx(default)]
    pub return_date: Option<DateTime<Utc>>,
}

impl BorrowRecord {
    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }
}

// ============================================================================
// NEW RECORD STRUCTS (for inserts)
// ============================================================================

/// New book record for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBook {
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub genre: Option<String>,
}

impl NewBook {
    pub fn new(isbn: String, title: String, author: String) -> Self {
        Self {
            isbn,
            title,
            author,
            genre: None,
        }
    }

    pub fn with_genre(mut self, genre: String) -> Self {
        self.genre = Some(genre);
        self
    }

    /// Trim every field and reject blank required ones.
    ///
    /// A blank genre is stored as NULL.
    pub fn validated(self) -> Result<Self> {
        Ok(Self {
            isbn: required("isbn", self.isbn)?,
            title: required("title", self.title)?,
            author: required("author", self.author)?,
            genre: optional(self.genre),
        })
    }
}

/// New user record for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub user_id: String,
    pub name: String,
    pub contact: Option<String>,
}

impl NewUser {
    pub fn new(user_id: String, name: String) -> Self {
        Self {
            user_id,
            name,
            contact: None,
        }
    }

    pub fn with_contact(mut self, contact: String) -> Self {
        self.contact = Some(contact);
        self
    }

    /// Trim every field and reject blank required ones.
    pub fn validated(self) -> Result<Self> {
        Ok(Self {
            user_id: required("user_id", self.user_id)?,
            name: required("name", self.name)?,
            contact: optional(self.contact),
        })
    }
}

fn required(field: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::invalid_input(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
