//! Runtime configuration loaded from environment variables.

use crate::error::{CatalogError, Result};
use crate::storage::Database;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Catalog configuration.
///
/// All fields have defaults suitable for a single desktop user.
#[derive(Debug, Clone)]
pub struct LibraryConfig {
    /// SQLite database file (default: platform data directory).
    pub database_path: PathBuf,
    /// Pool size (default: `5`).
    pub max_connections: u32,
    /// How long a writer waits for the SQLite lock (default: `30` seconds).
    pub busy_timeout: Duration,
    /// Emit logs as JSON lines instead of human-readable text (default: `false`).
    pub log_json: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            database_path: Database::get_default_path(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(30),
            log_json: false,
        }
    }
}

impl LibraryConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                   |
    /// |-----------------------------|---------------------------|
    /// | `LIBRARY_DATABASE_PATH`     | platform data directory   |
    /// | `LIBRARY_MAX_CONNECTIONS`   | `5`                       |
    /// | `LIBRARY_BUSY_TIMEOUT_SECS` | `30`                      |
    /// | `LIBRARY_LOG_JSON`          | `false`                   |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_path = lookup("LIBRARY_DATABASE_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let max_connections: u32 =
            parse_var(&lookup, "LIBRARY_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections);
        if max_connections == 0 {
            return Err(CatalogError::InvalidConfiguration(
                "LIBRARY_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        let busy_timeout = parse_var::<u64, _>(&lookup, "LIBRARY_BUSY_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.busy_timeout);

        let log_json = parse_var(&lookup, "LIBRARY_LOG_JSON")?.unwrap_or(defaults.log_json);

        Ok(Self {
            database_path,
            max_connections,
            busy_timeout,
            log_json,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            CatalogError::InvalidConfiguration(format!("{} has invalid value {:?}: {}", key, raw, e))
        }),
    }
}
