//! SQLite backend configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use trojan_config::defaults;

use crate::store::StoreAuthConfig;

/// Top-level document shape for the `sqlite` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSection {
    pub sqlite: SqliteConfig,
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path.
    ///
    /// `:memory:` (or `sqlite::memory:`) opens a private in-memory database;
    /// any other value starting with `sqlite:` is passed through as a URL.
    pub database: String,

    /// Seconds between counter flushes.
    pub check_interval_secs: u64,

    /// Maximum number of pooled connections.
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection.
    pub connect_timeout_secs: u64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database: defaults::DEFAULT_SQLITE_DATABASE.to_string(),
            check_interval_secs: defaults::DEFAULT_SQLITE_CHECK_INTERVAL_SECS,
            max_connections: defaults::DEFAULT_SQLITE_MAX_CONNECTIONS,
            connect_timeout_secs: defaults::DEFAULT_SQLITE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for the given database.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Builder: set max connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Builder: set connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    /// Builder: set flush interval.
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval_secs = interval.as_secs();
        self
    }

    /// Whether this names a private in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self.database.as_str(), ":memory:" | "sqlite::memory:")
    }

    /// Extract the generic [`StoreAuthConfig`] portion.
    pub(crate) fn store_auth_config(&self) -> StoreAuthConfig {
        StoreAuthConfig::default()
            .check_interval(Duration::from_secs(self.check_interval_secs.max(1)))
    }
}
