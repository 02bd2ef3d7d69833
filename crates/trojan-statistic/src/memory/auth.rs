//! In-memory authentication backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AuthError;
use crate::hash::sha224_hex;
use crate::traits::{Authenticator, Capabilities, TrafficMeter, User};

use super::user::MemoryUser;

/// In-memory authentication backend.
///
/// Users live in a shared map from identity hash to [`MemoryUser`]; clones
/// of a `MemoryAuth` share the same map. Nothing is persisted: this is
/// suitable for a fixed set of users, and it is the live-user layer of the
/// durable [`StoreAuth`](crate::store::StoreAuth).
///
/// [`close`](Authenticator::close) cancels the authenticator's shutdown
/// token, stopping a speed updater spawned on it.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuth {
    users: Arc<RwLock<HashMap<String, Arc<MemoryUser>>>>,
    shutdown: CancellationToken,
}

impl MemoryAuth {
    /// Create a new empty auth backend.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: stop background tasks with `shutdown` instead of a private token.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Token cancelled by [`close`](Authenticator::close).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Create from identity hashes.
    ///
    /// # Example
    /// ```
    /// use trojan_statistic::MemoryAuth;
    ///
    /// let auth = MemoryAuth::from_hashes(["abc123", "def456"]);
    /// assert_eq!(auth.len(), 2);
    /// ```
    pub fn from_hashes<I, S>(hashes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let auth = Self::new();
        for hash in hashes {
            auth.insert(MemoryUser::new(hash));
        }
        auth
    }

    /// Create from plaintext passwords (hashed with [`sha224_hex`]).
    pub fn from_passwords<I, S>(passwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_hashes(passwords.into_iter().map(|p| sha224_hex(p.as_ref())))
    }

    /// Get a live user by hash.
    #[inline]
    pub fn get(&self, hash: &str) -> Option<Arc<MemoryUser>> {
        self.users.read().get(hash).cloned()
    }

    /// Return the existing user for `hash`, or create one with default limits.
    pub fn get_or_create(&self, hash: &str) -> Arc<MemoryUser> {
        if let Some(user) = self.get(hash) {
            return user;
        }
        self.users
            .write()
            .entry(hash.to_string())
            .or_insert_with(|| Arc::new(MemoryUser::new(hash)))
            .clone()
    }

    /// Insert a user, replacing any user with the same hash.
    pub fn insert(&self, user: MemoryUser) -> Arc<MemoryUser> {
        let user = Arc::new(user);
        self.users
            .write()
            .insert(user.hash().to_string(), user.clone());
        user
    }

    /// Insert a user unless its hash is already live; returns the live user.
    pub fn insert_if_absent(&self, user: MemoryUser) -> Arc<MemoryUser> {
        self.users
            .write()
            .entry(user.hash().to_string())
            .or_insert_with(|| Arc::new(user))
            .clone()
    }

    /// Remove a user by hash.
    #[inline]
    pub fn remove(&self, hash: &str) -> Option<Arc<MemoryUser>> {
        self.users.write().remove(hash)
    }

    /// Snapshot of every live user.
    pub fn users(&self) -> Vec<Arc<MemoryUser>> {
        self.users.read().values().cloned().collect()
    }

    /// Get the number of registered users.
    #[inline]
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Check if no users are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }

    /// Check if a hash is registered.
    #[inline]
    pub fn contains(&self, hash: &str) -> bool {
        self.users.read().contains_key(hash)
    }

    /// Recompute the speed of every user from the last `elapsed` window.
    pub fn update_speed(&self, elapsed: Duration) {
        for user in self.users() {
            user.update_speed(elapsed);
        }
    }

    /// Spawn the task that refreshes user speeds every `window`.
    ///
    /// The task stops when `shutdown` is cancelled.
    pub fn spawn_speed_updater(&self, window: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let auth = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(window);
            let mut last = Instant::now();
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("speed updater shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let now = Instant::now();
                        auth.update_speed(now.duration_since(last));
                        last = now;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Authenticator for MemoryAuth {
    async fn auth_user(&self, hash: &str) -> Result<Option<Arc<dyn User>>, AuthError> {
        Ok(self.get(hash).map(|user| user as Arc<dyn User>))
    }

    async fn add_user(&self, hash: &str) -> Result<(), AuthError> {
        if hash.is_empty() {
            return Err(AuthError::InvalidInput("empty hash".into()));
        }
        self.get_or_create(hash);
        Ok(())
    }

    async fn del_user(&self, hash: &str) -> Result<(), AuthError> {
        self.remove(hash);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<Arc<dyn User>>, AuthError> {
        Ok(self
            .users()
            .into_iter()
            .map(|user| user as Arc<dyn User>)
            .collect())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    async fn close(&self) -> Result<(), AuthError> {
        self.shutdown.cancel();
        Ok(())
    }
}
