//! Default configuration values.
//!
//! Centralized default constants for every configuration section.

// ============================================================================
// Statistics Defaults
// ============================================================================

/// Track client source IPs per user (required for IP limits).
pub const DEFAULT_TRACK_CLIENT_IP: bool = true;
/// Window over which instantaneous speed is measured, in milliseconds.
pub const DEFAULT_SPEED_WINDOW_MS: u64 = 1000;

// ============================================================================
// SQLite Backend Defaults
// ============================================================================

/// Default SQLite database file.
pub const DEFAULT_SQLITE_DATABASE: &str = "trojan-stat.db";
/// Interval between flushes of live counters to the database, in seconds.
pub const DEFAULT_SQLITE_CHECK_INTERVAL_SECS: u64 = 30;
/// Maximum pooled SQLite connections.
pub const DEFAULT_SQLITE_MAX_CONNECTIONS: u32 = 4;
/// Timeout for acquiring a pooled SQLite connection, in seconds.
pub const DEFAULT_SQLITE_CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Redis Backend Defaults
// ============================================================================

/// Default Redis host.
pub const DEFAULT_REDIS_ADDR: &str = "127.0.0.1";
/// Default Redis port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;
/// Default Redis logical database.
pub const DEFAULT_REDIS_DB: i64 = 0;
/// Key prefix for per-user hashes.
pub const DEFAULT_REDIS_KEY_PREFIX: &str = "trojan:user:";
/// Maximum in-flight Redis commands.
pub const DEFAULT_REDIS_MAX_CONNECTIONS: usize = 16;
/// Per-command Redis timeout, in seconds.
pub const DEFAULT_REDIS_TIMEOUT_SECS: u64 = 5;
