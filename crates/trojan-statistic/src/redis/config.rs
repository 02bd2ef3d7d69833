//! Redis backend configuration.

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trojan_config::defaults;

/// Top-level document shape for the `redis` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSection {
    pub redis: RedisConfig,
}

/// Configuration for the Redis backend.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Full connection URL; overrides the individual fields below.
    pub url: Option<String>,
    pub server_addr: String,
    pub server_port: u16,
    /// Empty for no authentication.
    pub password: String,
    /// Logical database index.
    pub db: i64,
    /// Prefix of every per-user key.
    pub key_prefix: String,
    /// Maximum commands in flight at once.
    pub max_connections: usize,
    /// Per-command timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            server_addr: defaults::DEFAULT_REDIS_ADDR.to_string(),
            server_port: defaults::DEFAULT_REDIS_PORT,
            password: String::new(),
            db: defaults::DEFAULT_REDIS_DB,
            key_prefix: defaults::DEFAULT_REDIS_KEY_PREFIX.to_string(),
            max_connections: defaults::DEFAULT_REDIS_MAX_CONNECTIONS,
            timeout_secs: defaults::DEFAULT_REDIS_TIMEOUT_SECS,
        }
    }
}

impl RedisConfig {
    /// Create a config from a connection URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Builder: set key prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Builder: set max in-flight commands.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    /// Builder: set per-command timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Connection URL.
    pub fn url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let mut url = String::from("redis://");
        if !self.password.is_empty() {
            url.push(':');
            url.push_str(&encode_userinfo(&self.password));
            url.push('@');
        }
        let _ = write!(url, "{}:{}/{}", self.server_addr, self.server_port, self.db);
        url
    }
}

/// Percent-encode everything but unreserved URL characters.
fn encode_userinfo(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

// Debug implementation (don't leak credentials)
impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("server_addr", &self.server_addr)
            .field("server_port", &self.server_port)
            .field("db", &self.db)
            .field("key_prefix", &self.key_prefix)
            .field("max_connections", &self.max_connections)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_from_fields() {
        assert_eq!(RedisConfig::default().url(), "redis://127.0.0.1:6379/0");

        let config = RedisConfig {
            server_addr: "cache.internal".into(),
            server_port: 6380,
            password: "p@ss word".into(),
            db: 2,
            ..Default::default()
        };
        assert_eq!(config.url(), "redis://:p%40ss%20word@cache.internal:6380/2");
    }

    #[test]
    fn test_explicit_url_wins() {
        let config = RedisConfig::from_url("redis://example:1234/5");
        assert_eq!(config.url(), "redis://example:1234/5");
    }

    #[test]
    fn test_debug_hides_password() {
        let config = RedisConfig {
            password: "hunter2".into(),
            ..RedisConfig::from_url("redis://:hunter2@host/0")
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_section_keeps_defaults() {
        let section: RedisSection =
            serde_json::from_str(r#"{"redis": {"server_port": 7000, "key_prefix": "t:"}}"#)
                .unwrap();
        assert_eq!(section.redis.server_port, 7000);
        assert_eq!(section.redis.key_prefix, "t:");
        assert_eq!(section.redis.server_addr, "127.0.0.1");
        assert_eq!(section.redis.max_connections, 16);
    }
}
