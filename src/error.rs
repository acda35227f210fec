//! Error types for the library catalog
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are categorized by who can fix them: lending-rule rejections the caller
//! caused (limit reached, nothing to return, book out), catalog constraint
//! violations (duplicate or unknown keys), and storage failures.
//!
//! ## Error kinds seen by callers
//!
//! - `DuplicateKey` - inserting an existing ISBN or user ID
//! - `NotFound` - referencing an unknown ISBN, user ID or borrow record
//! - `BorrowLimitExceeded` - user already holds the maximum of active borrows
//! - `NoActiveBorrow` - return attempted with no matching active record
//! - `BookUnavailable` - borrow attempted on a book that is already out
//! - `StoreUnavailable` - the SQLite database cannot be reached
//!
//! Every mutating operation that fails leaves no partial effect behind; the
//! lending engine rolls its transaction back before returning one of these.

use thiserror::Error;

/// Result type alias using our CatalogError type
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Main error type for the library catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    // ===== Catalog Constraint Errors =====

    /// A record with the same primary key already exists
    #[error("{entity} already exists: {key}")]
    DuplicateKey {
        /// Entity kind ("book", "user")
        entity: &'static str,
        key: String,
    },

    /// Referenced record does not exist
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Entity kind ("book", "user", "borrow record")
        entity: &'static str,
        key: String,
    },

    // ===== Lending Rule Errors =====

    /// User already holds the maximum number of active borrows
    #[error("Borrow limit ({limit}) reached for user {user_id}")]
    BorrowLimitExceeded { user_id: String, limit: i64 },

    /// No active borrow exists for the given user and book
    #[error("No active borrow of {isbn} by user {user_id}")]
    NoActiveBorrow { user_id: String, isbn: String },

    /// Book is currently borrowed by someone
    #[error("Book is not available: {isbn}")]
    BookUnavailable { isbn: String },

    /// Caller lacks the capability required for the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // ===== Input/Configuration Errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ===== Storage Errors =====

    /// Persistence layer cannot be reached (pool closed, I/O failure, timeout)
    #[error("Catalog store unavailable: {0}")]
    StoreUnavailable(String),

    /// Database schema migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database driver error from sqlx
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

/// Classify driver errors: connectivity problems become `StoreUnavailable`,
/// everything else stays a plain database error.
impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        if is_unreachable(&err) {
            return CatalogError::StoreUnavailable(err.to_string());
        }
        CatalogError::Database(err)
    }
}

// SQLite primary result codes (low byte of the extended code)
const SQLITE_BUSY: i32 = 5;
const SQLITE_IOERR: i32 = 10;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;

fn is_unreachable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_) => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map_or(false, |code| is_unreachable_code(&code)),
        _ => false,
    }
}

/// Whether a SQLite (extended) result code means the file store itself failed:
/// locked past the busy timeout, I/O error, disk full, or cannot open.
fn is_unreachable_code(code: &str) -> bool {
    match code.parse::<i32>() {
        Ok(code) => matches!(
            code & 0xff,
            SQLITE_BUSY | SQLITE_IOERR | SQLITE_FULL | SQLITE_CANTOPEN
        ),
        Err(_) => false,
    }
}

// Helper methods for creating common errors
impl CatalogError {
    /// Create a NotFound error for a book ISBN
    pub fn book_not_found<S: Into<String>>(isbn: S) -> Self {
        CatalogError::NotFound {
            entity: "book",
            key: isbn.into(),
        }
    }

    /// Create a NotFound error for a user ID
    pub fn user_not_found<S: Into<String>>(user_id: S) -> Self {
        CatalogError::NotFound {
            entity: "user",
            key: user_id.into(),
        }
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        CatalogError::InvalidInput(message.into())
    }

    /// Map a failed insert to `DuplicateKey` when the driver reports a
    /// primary-key/unique violation, otherwise classify it normally.
    pub fn from_insert(err: sqlx::Error, entity: &'static str, key: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return CatalogError::DuplicateKey {
                    entity,
                    key: key.to_string(),
                };
            }
        }
        err.into()
    }

    /// Check if the error was caused by the request itself
    ///
    /// Returns `true` when retrying the same call cannot succeed without the
    /// catalog changing first (limit reached, duplicate key, bad input, ...).
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            CatalogError::DuplicateKey { .. }
                | CatalogError::NotFound { .. }
                | CatalogError::BorrowLimitExceeded { .. }
                | CatalogError::NoActiveBorrow { .. }
                | CatalogError::BookUnavailable { .. }
                | CatalogError::PermissionDenied(_)
                | CatalogError::InvalidInput(_)
        )
    }

    /// Check if error is related to the persistence layer
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            CatalogError::StoreUnavailable(_)
                | CatalogError::MigrationFailed(_)
                | CatalogError::Database(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            CatalogError::BorrowLimitExceeded { user_id, limit } => {
                format!(
                    "User {} already has {} books borrowed. Return one before borrowing another.",
                    user_id, limit
                )
            }
            CatalogError::NoActiveBorrow { user_id, isbn } => {
                format!("User {} has not borrowed the book with ISBN {}.", user_id, isbn)
            }
            CatalogError::BookUnavailable { isbn } => {
                format!("The book with ISBN {} is currently borrowed.", isbn)
            }
            CatalogError::DuplicateKey { entity, key } => {
                format!("A {} with ID {} is already registered.", entity, key)
            }
            CatalogError::StoreUnavailable(_) => {
                "The catalog database is unavailable. Please try again later.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_store_unavailable() {
        let err: CatalogError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, CatalogError::StoreUnavailable(_)));
        assert!(err.is_store_error());
        assert!(!err.is_rule_violation());
    }

    #[test]
    fn test_row_not_found_stays_database_error() {
        let err: CatalogError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, CatalogError::Database(_)));
    }

    #[test]
    fn test_sqlite_storage_codes_are_unreachable() {
        // CANTOPEN, IOERR_WRITE (extended), FULL, BUSY
        assert!(is_unreachable_code("14"));
        assert!(is_unreachable_code("778"));
        assert!(is_unreachable_code("13"));
        assert!(is_unreachable_code("5"));

        // UNIQUE, trigger abort, FOREIGNKEY stay driver errors
        assert!(!is_unreachable_code("2067"));
        assert!(!is_unreachable_code("1811"));
        assert!(!is_unreachable_code("787"));
        assert!(!is_unreachable_code("not-a-code"));
    }

    #[test]
    fn test_user_message_for_limit() {
        let err = CatalogError::BorrowLimitExceeded {
            user_id: "U1".to_string(),
            limit: 5,
        };
        assert!(err.is_rule_violation());
        assert!(err.user_message().contains("U1"));
        assert_eq!(err.to_string(), "Borrow limit (5) reached for user U1");
    }

    #[test]
    fn test_not_found_helpers() {
        let err = CatalogError::book_not_found("978-1");
        assert_eq!(err.to_string(), "book not found: 978-1");
        let err = CatalogError::user_not_found("U9");
        assert_eq!(err.to_string(), "user not found: U9");
    }
}
