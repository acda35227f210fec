//! Library catalog core: books, users and borrow/return bookkeeping on SQLite.
//!
//! Front ends talk to [`Library`]; it runs borrow and return as single
//! transactions through the [`lending`] engine and serves reads through
//! [`CatalogQueries`].

pub mod catalog;
pub mod config;
pub mod error;
pub mod lending;
pub mod storage;
pub mod telemetry;

pub use catalog::{Caller, CatalogQueries, Library, Role};
pub use config::LibraryConfig;
pub use error::{CatalogError, Result};
pub use lending::{LendingEngine, LendingPolicy, DEFAULT_BORROW_LIMIT};
pub use storage::{Book, BorrowRecord, Database, NewBook, NewUser, User};
