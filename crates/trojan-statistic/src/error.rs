//! Authentication and accounting error types.

use trojan_config::ConfigError;

/// Authentication and accounting error.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No user matches the given hash.
    #[error("user not found")]
    NotFound,

    /// A caller violated the contract (e.g. persisting an empty identity).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Backend error (database, network, etc.).
    #[error("backend error: {0}")]
    Backend(String),

    /// The authenticator has been closed or its context cancelled.
    #[error("authenticator closed")]
    Closed,

    /// The user already has the maximum number of distinct IPs connected.
    #[error("ip limit exceeded")]
    IpLimitExceeded,

    /// No authenticator creator is registered under the requested name.
    #[error("authenticator backend not found: {0}")]
    BackendNotFound(String),

    /// A registered creator failed to build its authenticator.
    #[error("failed to create authenticator {backend}: {source}")]
    Create {
        backend: String,
        #[source]
        source: Box<AuthError>,
    },

    /// Configuration could not be loaded or bound.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

impl AuthError {
    /// Create a backend error from any error type.
    #[inline]
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    /// Whether this error is the "no such user" result.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::PoolClosed => Self::Closed,
            other => Self::backend(other),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        Self::backend(err)
    }
}
