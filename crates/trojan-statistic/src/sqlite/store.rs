//! SQLite user store.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::AuthError;
use crate::store::{
    StoreAuth, UserRecord, UserStore, UserVisitor, decode_counter, encode_counter,
};

use super::config::SqliteConfig;
use super::queries;

/// Durable [`UserStore`] over an sqlx SQLite pool.
///
/// Counters are stored as 8-byte big-endian blobs; limits as integers.
/// Every write is committed before it returns.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    database: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database and its schema.
    pub async fn connect(config: &SqliteConfig) -> Result<Self, AuthError> {
        let acquire_timeout = Duration::from_secs(config.connect_timeout_secs);

        let pool = if config.is_memory() {
            // Every connection to :memory: is a separate database; keep one forever.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(acquire_timeout)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            let options = if config.database.starts_with("sqlite:") {
                SqliteConnectOptions::from_str(&config.database)?
            } else {
                SqliteConnectOptions::new().filename(&config.database)
            };
            let options = options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);

            SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .acquire_timeout(acquire_timeout)
                .connect_with(options)
                .await?
        };

        sqlx::query(queries::CREATE_USERS).execute(&pool).await?;
        info!(database = %config.database, "sqlite store opened");

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Get the connection pool (for advanced usage).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn parse_row(row: &SqliteRow) -> Result<UserRecord, AuthError> {
        let sent: Vec<u8> = row.try_get("sent")?;
        let recv: Vec<u8> = row.try_get("recv")?;
        Ok(UserRecord {
            hash: row.try_get("hash")?,
            sent: decode_counter(&sent)?,
            recv: decode_counter(&recv)?,
            max_ip_num: from_column(row.try_get("max_ip_num")?, "max_ip_num")?,
            send_limit: from_column(row.try_get("send_limit")?, "send_limit")?,
            recv_limit: from_column(row.try_get("recv_limit")?, "recv_limit")?,
        })
    }
}

fn from_column<T: TryFrom<i64>>(value: i64, column: &str) -> Result<T, AuthError> {
    T::try_from(value).map_err(|_| AuthError::Backend(format!("{column} out of range: {value}")))
}

fn to_column<T: TryInto<i64> + Copy + std::fmt::Display>(
    value: T,
    column: &str,
) -> Result<i64, AuthError> {
    value
        .try_into()
        .map_err(|_| AuthError::InvalidInput(format!("{column} out of range: {value}")))
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn save_user(&self, record: &UserRecord) -> Result<(), AuthError> {
        if record.hash.is_empty() {
            return Err(AuthError::InvalidInput("empty hash".into()));
        }

        sqlx::query(queries::UPSERT_USER)
            .bind(record.hash.as_str())
            .bind(encode_counter(record.sent).to_vec())
            .bind(encode_counter(record.recv).to_vec())
            .bind(to_column(record.max_ip_num, "max_ip_num")?)
            .bind(to_column(record.send_limit, "send_limit")?)
            .bind(to_column(record.recv_limit, "recv_limit")?)
            .execute(&self.pool)
            .await?;
        debug!(hash = %record.hash, "user saved");
        Ok(())
    }

    async fn load_user(&self, hash: &str) -> Result<UserRecord, AuthError> {
        let row = sqlx::query(queries::SELECT_USER)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::NotFound)?;
        Self::parse_row(&row)
    }

    async fn delete_user(&self, hash: &str) -> Result<(), AuthError> {
        sqlx::query(queries::DELETE_USER)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_users(&self, visit: UserVisitor<'_>) -> Result<(), AuthError> {
        let rows = sqlx::query(queries::SELECT_USERS)
            .fetch_all(&self.pool)
            .await?;
        for row in &rows {
            if visit(Self::parse_row(row)?).is_break() {
                break;
            }
        }
        Ok(())
    }

    async fn update_user_traffic(
        &self,
        hash: &str,
        sent: u64,
        recv: u64,
    ) -> Result<(), AuthError> {
        let result = sqlx::query(queries::UPDATE_TRAFFIC)
            .bind(encode_counter(sent).to_vec())
            .bind(encode_counter(recv).to_vec())
            .bind(hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), AuthError> {
        self.pool.close().await;
        info!(database = %self.database, "sqlite store closed");
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("database", &self.database)
            .field("pool_size", &self.pool.size())
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

/// SQLite-backed authenticator.
pub type SqliteAuth = StoreAuth<SqliteStore>;

impl StoreAuth<SqliteStore> {
    /// Open the database and start the flush loop.
    ///
    /// The loop stops, flushes and closes the database when `shutdown` is
    /// cancelled or the authenticator is closed.
    pub async fn connect(
        config: &SqliteConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, AuthError> {
        let store = SqliteStore::connect(config).await?;
        Self::open_with_shutdown(store, config.store_auth_config(), shutdown).await
    }
}
