//! Redis authenticator and user.

use std::collections::BTreeSet;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::traits::{Authenticator, Capabilities, IpRecorder, TrafficMeter, User};

use super::config::RedisConfig;
use super::scripts;

/// Traffic and user management only; speed and IP limits are not enforced.
pub const REDIS_CAPABILITIES: Capabilities = Capabilities {
    traffic: true,
    speed_limit: false,
    ip_limit: false,
    user_management: true,
};

/// Number of keys requested per SCAN round-trip.
const SCAN_COUNT: usize = 512;

/// Connection state shared by the authenticator and every user it hands out.
struct Shared {
    conn: ConnectionManager,
    permits: Semaphore,
    timeout: Duration,
    prefix: String,
    add_traffic: Script,
    get_and_reset: Script,
    shutdown: CancellationToken,
}

impl Shared {
    fn key(&self, hash: &str) -> String {
        format!("{}{hash}", self.prefix)
    }

    /// Run one command under the in-flight bound and the command timeout.
    async fn run<T>(&self, command: impl Future<Output = RedisResult<T>>) -> Result<T, AuthError> {
        if self.shutdown.is_cancelled() {
            return Err(AuthError::Closed);
        }
        let _permit = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(AuthError::Closed),
            permit = self.permits.acquire() => permit.map_err(|_| AuthError::Closed)?,
        };

        match tokio::time::timeout(self.timeout, command).await {
            Ok(result) => result.map_err(AuthError::from),
            Err(_) => Err(AuthError::Backend(format!(
                "redis command timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Authenticator whose counters live in Redis.
///
/// Each user is a hash at `{key_prefix}{hash}` with integer fields `upload`
/// and `download`. Relays on any number of hosts may share one server;
/// counter updates are server-side scripts and never interleave.
///
/// Speed and IP limits are not enforced by this backend: the corresponding
/// calls are no-ops and [`capabilities`](Authenticator::capabilities) says so.
#[derive(Clone)]
pub struct RedisAuth {
    shared: Arc<Shared>,
}

impl RedisAuth {
    /// Connect to the server.
    ///
    /// After `shutdown` is cancelled (or [`close`](Authenticator::close) is
    /// called) every operation fails fast with [`AuthError::Closed`].
    pub async fn connect(
        config: &RedisConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, AuthError> {
        let client = redis::Client::open(config.url())?;
        let timeout = config.command_timeout();
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| AuthError::Backend(format!("redis connect timed out after {timeout:?}")))??;

        info!(
            addr = %config.server_addr,
            prefix = %config.key_prefix,
            max_connections = config.max_connections,
            "redis authenticator connected"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                conn,
                permits: Semaphore::new(config.max_connections.max(1)),
                timeout,
                prefix: config.key_prefix.clone(),
                add_traffic: Script::new(scripts::ADD_TRAFFIC),
                get_and_reset: Script::new(scripts::GET_AND_RESET),
                shutdown,
            }),
        })
    }

    /// Key of a user's hash.
    pub fn key(&self, hash: &str) -> String {
        self.shared.key(hash)
    }

    fn user(&self, hash: &str) -> RedisUser {
        RedisUser {
            hash: hash.to_string(),
            key: self.key(hash),
            shared: self.shared.clone(),
        }
    }
}

#[async_trait]
impl Authenticator for RedisAuth {
    async fn auth_user(&self, hash: &str) -> Result<Option<Arc<dyn User>>, AuthError> {
        let key = self.key(hash);
        let mut conn = self.shared.conn.clone();
        let exists: bool = self
            .shared
            .run(async move { redis::cmd("EXISTS").arg(&key).query_async(&mut conn).await })
            .await?;

        Ok(exists.then(|| Arc::new(self.user(hash)) as Arc<dyn User>))
    }

    async fn add_user(&self, hash: &str) -> Result<(), AuthError> {
        if hash.is_empty() {
            return Err(AuthError::InvalidInput("empty hash".into()));
        }
        let key = self.key(hash);
        let mut conn = self.shared.conn.clone();
        self.shared
            .run(async move {
                redis::pipe()
                    .atomic()
                    .cmd("HSETNX")
                    .arg(&key)
                    .arg("upload")
                    .arg(0)
                    .ignore()
                    .cmd("HSETNX")
                    .arg(&key)
                    .arg("download")
                    .arg(0)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await
            })
            .await?;
        debug!(hash, "user added");
        Ok(())
    }

    async fn del_user(&self, hash: &str) -> Result<(), AuthError> {
        let key = self.key(hash);
        let mut conn = self.shared.conn.clone();
        self.shared
            .run(async move { redis::cmd("DEL").arg(&key).query_async::<()>(&mut conn).await })
            .await?;
        debug!(hash, "user deleted");
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<Arc<dyn User>>, AuthError> {
        let pattern = format!("{}*", self.shared.prefix);
        let mut hashes = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let mut conn = self.shared.conn.clone();
            let pattern = pattern.as_str();
            let (next, keys): (u64, Vec<String>) = self
                .shared
                .run(async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_COUNT)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            // SCAN may report a key more than once
            hashes.extend(
                keys.iter()
                    .filter_map(|key| key.strip_prefix(self.shared.prefix.as_str()))
                    .map(str::to_string),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(hashes
            .iter()
            .map(|hash| Arc::new(self.user(hash)) as Arc<dyn User>)
            .collect())
    }

    fn capabilities(&self) -> Capabilities {
        REDIS_CAPABILITIES
    }

    async fn close(&self) -> Result<(), AuthError> {
        self.shared.shutdown.cancel();
        info!("redis authenticator closed");
        Ok(())
    }
}

impl std::fmt::Debug for RedisAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAuth")
            .field("prefix", &self.shared.prefix)
            .field("timeout", &self.shared.timeout)
            .field("closed", &self.shared.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Live handle on one user's hash.
pub struct RedisUser {
    hash: String,
    key: String,
    shared: Arc<Shared>,
}

impl RedisUser {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl TrafficMeter for RedisUser {
    fn hash(&self) -> &str {
        &self.hash
    }

    async fn add_traffic(&self, sent: u64, recv: u64) {
        if sent == 0 && recv == 0 {
            return;
        }
        let mut conn = self.shared.conn.clone();
        let mut invocation = self.shared.add_traffic.key(&self.key);
        invocation.arg(recv).arg(sent);

        let result = self
            .shared
            .run(async move { invocation.invoke_async::<i64>(&mut conn).await })
            .await;
        match result {
            Ok(1) => {}
            Ok(_) => debug!(hash = %self.hash, "traffic for missing user ignored"),
            Err(e) => warn!(hash = %self.hash, sent, recv, error = %e, "dropped traffic update"),
        }
    }

    async fn get_traffic(&self) -> Result<(u64, u64), AuthError> {
        let key = self.key.as_str();
        let mut conn = self.shared.conn.clone();
        let (upload, download): (Option<u64>, Option<u64>) = self
            .shared
            .run(async move {
                redis::cmd("HMGET")
                    .arg(key)
                    .arg("upload")
                    .arg("download")
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok((download.unwrap_or(0), upload.unwrap_or(0)))
    }

    async fn get_and_reset_traffic(&self) -> Result<(u64, u64), AuthError> {
        let mut conn = self.shared.conn.clone();
        let invocation = self.shared.get_and_reset.key(&self.key);
        let (upload, download): (u64, u64) = self
            .shared
            .run(async move { invocation.invoke_async(&mut conn).await })
            .await?;
        Ok((download, upload))
    }

    fn get_speed(&self) -> (u64, u64) {
        (0, 0)
    }

    fn set_speed_limit(&self, send: u64, recv: u64) {
        debug!(hash = %self.hash, send, recv, "speed limits are not enforced by redis");
    }

    fn get_speed_limit(&self) -> (u64, u64) {
        (0, 0)
    }

    fn capabilities(&self) -> Capabilities {
        REDIS_CAPABILITIES
    }
}

impl IpRecorder for RedisUser {
    fn add_ip(&self, _ip: IpAddr) -> bool {
        true
    }

    fn del_ip(&self, _ip: IpAddr) -> bool {
        false
    }

    fn get_ip(&self) -> usize {
        0
    }

    fn set_ip_limit(&self, max: usize) {
        debug!(hash = %self.hash, max, "ip limits are not enforced by redis");
    }

    fn get_ip_limit(&self) -> usize {
        0
    }
}

impl std::fmt::Debug for RedisUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisUser")
            .field("hash", &self.hash)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
