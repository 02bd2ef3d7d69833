//! Authenticator over a durable [`UserStore`].
//!
//! [`StoreAuth<S>`] keeps every user live in a [`MemoryAuth`] so the data
//! path never waits on the store, and reconciles with the store in the
//! background:
//! - counters are written back every `check_interval`, along with limits
//!   changed on a live user since the last sync
//! - rows deleted out-of-band drop their live user
//! - rows added out-of-band become live, and limit edits are re-applied
//! - on shutdown a final flush runs before the store is closed
//!
//! A limit changed both on the live user and in the store within one
//! interval resolves to the live value.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::memory::MemoryAuth;
use crate::traits::{Authenticator, Capabilities, TrafficMeter, User};

use super::config::StoreAuthConfig;
use super::record::UserRecord;
use super::traits::UserStore;

/// Durable authenticator wrapping a [`UserStore`].
///
/// # Type parameter
///
/// - `S` — the underlying store (e.g. `SqliteStore`)
pub struct StoreAuth<S: UserStore> {
    inner: Arc<Inner<S>>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// `(send_limit, recv_limit, max_ip_num)`.
type Limits = (u64, u64, usize);

struct Inner<S> {
    store: S,
    users: MemoryAuth,
    /// Limits the store and each live user last agreed on. Held for the
    /// whole of a sync and of every user-management call.
    synced: tokio::sync::Mutex<HashMap<String, Limits>>,
}

impl<S: UserStore> StoreAuth<S> {
    /// Load every stored user and start the background loop.
    pub async fn open(store: S, config: StoreAuthConfig) -> Result<Self, AuthError> {
        Self::open_with_shutdown(store, config, CancellationToken::new()).await
    }

    /// Like [`open`](Self::open), stopping the background loop when
    /// `shutdown` is cancelled.
    pub async fn open_with_shutdown(
        store: S,
        config: StoreAuthConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, AuthError> {
        let users = MemoryAuth::new();
        let mut synced = HashMap::new();
        store
            .list_users(&mut |record: UserRecord| {
                synced.insert(record.hash.clone(), record.limits());
                users.insert(record.into_user());
                ControlFlow::Continue(())
            })
            .await?;
        info!(users = synced.len(), "loaded users from store");

        let inner = Arc::new(Inner {
            store,
            users,
            synced: tokio::sync::Mutex::new(synced),
        });
        inner
            .users
            .spawn_speed_updater(config.speed_window, shutdown.clone());
        let task = tokio::spawn(run(inner.clone(), config.check_interval, shutdown.clone()));

        Ok(Self {
            inner,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// The live users.
    pub fn memory(&self) -> &MemoryAuth {
        &self.inner.users
    }

    /// Write every live user's counters, and any limits changed on it, to
    /// the store.
    ///
    /// Returns the number of users written.
    pub async fn flush(&self) -> Result<usize, AuthError> {
        self.inner.flush().await
    }

    /// Flush, then pick up rows added or edited out-of-band.
    pub async fn sync(&self) -> Result<(), AuthError> {
        self.inner.sync().await
    }

    /// Set a user's limits in the store and on its live user.
    ///
    /// Fails with [`AuthError::NotFound`] if the user is unknown.
    pub async fn set_user_limits(
        &self,
        hash: &str,
        send_limit: u64,
        recv_limit: u64,
        max_ip_num: usize,
    ) -> Result<(), AuthError> {
        self.check_open()?;
        let mut synced = self.inner.synced.lock().await;
        let live = self.inner.users.get(hash);
        let record = match &live {
            Some(user) => UserRecord::from_user(user),
            None => self.inner.store.load_user(hash).await?,
        }
        .with_limits(send_limit, recv_limit, max_ip_num);

        self.inner.store.save_user(&record).await?;
        if let Some(user) = live {
            record.apply_limits(&user);
            synced.insert(record.hash.clone(), record.limits());
        }
        debug!(hash, send_limit, recv_limit, max_ip_num, "user limits updated");
        Ok(())
    }

    fn check_open(&self) -> Result<(), AuthError> {
        if self.shutdown.is_cancelled() {
            Err(AuthError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<S: UserStore> Inner<S> {
    async fn flush(&self) -> Result<usize, AuthError> {
        let mut synced = self.synced.lock().await;
        self.flush_locked(&mut synced).await
    }

    async fn flush_locked(&self, synced: &mut HashMap<String, Limits>) -> Result<usize, AuthError> {
        let mut written = 0;
        for user in self.users.users() {
            let hash = user.hash();
            let record = UserRecord::from_user(&user);
            match self
                .store
                .update_user_traffic(hash, record.sent, record.recv)
                .await
            {
                Ok(()) => written += 1,
                Err(AuthError::NotFound) => {
                    self.users.remove(hash);
                    synced.remove(hash);
                    info!(hash, "user deleted from store, dropped");
                    continue;
                }
                Err(e) => return Err(e),
            }

            let limits = record.limits();
            if synced.get(hash) != Some(&limits) {
                self.store.save_user(&record).await?;
                synced.insert(hash.to_string(), limits);
                debug!(hash, "user limits saved");
            }
        }
        Ok(written)
    }

    async fn reload_locked(&self, synced: &mut HashMap<String, Limits>) -> Result<usize, AuthError> {
        let mut added = 0;
        self.store
            .list_users(&mut |record: UserRecord| {
                let limits = record.limits();
                match self.users.get(&record.hash) {
                    Some(user) => {
                        // Only edits made in the store since the last sync
                        if synced.get(&record.hash) != Some(&limits) {
                            record.apply_limits(&user);
                            synced.insert(record.hash.clone(), limits);
                        }
                    }
                    None => {
                        debug!(hash = %record.hash, "user added from store");
                        synced.insert(record.hash.clone(), limits);
                        self.users.insert_if_absent(record.into_user());
                        added += 1;
                    }
                }
                ControlFlow::Continue(())
            })
            .await?;
        Ok(added)
    }

    async fn sync(&self) -> Result<(), AuthError> {
        let mut synced = self.synced.lock().await;
        let written = self.flush_locked(&mut synced).await?;
        let added = self.reload_locked(&mut synced).await?;
        debug!(written, added, "store synced");
        Ok(())
    }
}

async fn run<S: UserStore>(inner: Arc<Inner<S>>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = inner.sync().await {
                    warn!(error = %e, "store sync failed");
                }
            }
        }
    }

    match inner.flush().await {
        Ok(written) => debug!(written, "final flush complete"),
        Err(e) => warn!(error = %e, "final flush failed"),
    }
    if let Err(e) = inner.store.close().await {
        warn!(error = %e, "failed to close store");
    }
    info!("store authenticator stopped");
}

#[async_trait]
impl<S: UserStore> Authenticator for StoreAuth<S> {
    async fn auth_user(&self, hash: &str) -> Result<Option<Arc<dyn User>>, AuthError> {
        self.check_open()?;
        Ok(self.inner.users.get(hash).map(|user| user as Arc<dyn User>))
    }

    async fn add_user(&self, hash: &str) -> Result<(), AuthError> {
        self.check_open()?;
        if hash.is_empty() {
            return Err(AuthError::InvalidInput("empty hash".into()));
        }
        let mut synced = self.inner.synced.lock().await;
        if self.inner.users.contains(hash) {
            return Ok(());
        }

        let record = match self.inner.store.load_user(hash).await {
            Ok(record) => record,
            Err(AuthError::NotFound) => {
                let record = UserRecord::new(hash);
                self.inner.store.save_user(&record).await?;
                record
            }
            Err(e) => return Err(e),
        };
        synced.insert(record.hash.clone(), record.limits());
        self.inner.users.insert_if_absent(record.into_user());
        debug!(hash, "user added");
        Ok(())
    }

    async fn del_user(&self, hash: &str) -> Result<(), AuthError> {
        self.check_open()?;
        let mut synced = self.inner.synced.lock().await;
        self.inner.store.delete_user(hash).await?;
        self.inner.users.remove(hash);
        synced.remove(hash);
        debug!(hash, "user deleted");
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<Arc<dyn User>>, AuthError> {
        self.check_open()?;
        self.inner.users.list_users().await
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    async fn close(&self) -> Result<(), AuthError> {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await
                .map_err(|e| AuthError::Backend(format!("store task failed: {e}")))?;
        }
        Ok(())
    }
}

impl<S: UserStore> Drop for StoreAuth<S> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<S: UserStore + std::fmt::Debug> std::fmt::Debug for StoreAuth<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAuth")
            .field("store", &self.inner.store)
            .field("users", &self.inner.users.len())
            .field("closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::store::UserVisitor;
    use crate::traits::IpRecorder;

    /// Store double keeping rows in a map.
    #[derive(Default)]
    struct MapStore {
        rows: Mutex<HashMap<String, UserRecord>>,
        closed: AtomicBool,
        /// Pause between snapshotting and visiting rows.
        list_delay: Option<Duration>,
    }

    impl MapStore {
        fn with_rows(rows: impl IntoIterator<Item = UserRecord>) -> Self {
            let store = Self::default();
            store
                .rows
                .lock()
                .extend(rows.into_iter().map(|r| (r.hash.clone(), r)));
            store
        }

        fn row(&self, hash: &str) -> Option<UserRecord> {
            self.rows.lock().get(hash).cloned()
        }

        fn check(&self) -> Result<(), AuthError> {
            if self.closed.load(Ordering::SeqCst) {
                Err(AuthError::Closed)
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl UserStore for MapStore {
        async fn save_user(&self, record: &UserRecord) -> Result<(), AuthError> {
            self.check()?;
            if record.hash.is_empty() {
                return Err(AuthError::InvalidInput("empty hash".into()));
            }
            self.rows.lock().insert(record.hash.clone(), record.clone());
            Ok(())
        }

        async fn load_user(&self, hash: &str) -> Result<UserRecord, AuthError> {
            self.check()?;
            self.row(hash).ok_or(AuthError::NotFound)
        }

        async fn delete_user(&self, hash: &str) -> Result<(), AuthError> {
            self.check()?;
            self.rows.lock().remove(hash);
            Ok(())
        }

        async fn list_users(&self, visit: UserVisitor<'_>) -> Result<(), AuthError> {
            self.check()?;
            let rows: Vec<_> = self.rows.lock().values().cloned().collect();
            if let Some(delay) = self.list_delay {
                tokio::time::sleep(delay).await;
            }
            for row in rows {
                if visit(row).is_break() {
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
            self.check()?;
            let mut rows = self.rows.lock();
            let row = rows.get_mut(hash).ok_or(AuthError::NotFound)?;
            row.sent = sent;
            row.recv = recv;
            Ok(())
        }

        async fn close(&self) -> Result<(), AuthError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> StoreAuthConfig {
        StoreAuthConfig::default().check_interval(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_open_loads_counters_and_limits() {
        let store = MapStore::with_rows([UserRecord {
            hash: "abc".into(),
            sent: 100,
            recv: 200,
            max_ip_num: 2,
            send_limit: 1000,
            recv_limit: 0,
        }]);
        let auth = StoreAuth::open(store, config()).await.unwrap();

        let user = auth.auth_user("abc").await.unwrap().unwrap();
        assert_eq!(user.get_traffic().await.unwrap(), (100, 200));
        assert_eq!(user.get_speed_limit(), (1000, 0));
        assert_eq!(user.get_ip_limit(), 2);
        assert!(auth.auth_user("unknown-hash").await.unwrap().is_none());
        auth.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_writes_absolute_counters() {
        let auth = StoreAuth::open(MapStore::default(), config()).await.unwrap();
        auth.add_user("abc").await.unwrap();
        assert_eq!(auth.store().row("abc").unwrap(), UserRecord::new("abc"));

        let user = auth.auth_user("abc").await.unwrap().unwrap();
        user.add_traffic(100, 200).await;
        user.add_traffic(50, 0).await;
        assert_eq!(auth.flush().await.unwrap(), 1);

        let row = auth.store().row("abc").unwrap();
        assert_eq!((row.sent, row.recv), (150, 200));
        auth.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_follows_out_of_band_changes() {
        let auth = StoreAuth::open(MapStore::default(), config()).await.unwrap();
        auth.add_user("gone").await.unwrap();
        auth.store()
            .save_user(&UserRecord::new("new").with_limits(0, 0, 1))
            .await
            .unwrap();
        auth.store().delete_user("gone").await.unwrap();

        auth.sync().await.unwrap();
        assert!(auth.auth_user("gone").await.unwrap().is_none());
        let user = auth.auth_user("new").await.unwrap().unwrap();
        assert_eq!(user.get_ip_limit(), 1);

        // Limit edits on existing users are re-applied
        auth.store()
            .save_user(&UserRecord::new("new").with_limits(10, 20, 3))
            .await
            .unwrap();
        auth.sync().await.unwrap();
        assert_eq!(user.get_speed_limit(), (10, 20));
        assert_eq!(user.get_ip_limit(), 3);
        auth.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_user_keeps_stored_row() {
        let store = MapStore::default();
        store.rows.lock().insert(
            "abc".into(),
            UserRecord {
                sent: 7,
                ..UserRecord::new("abc").with_limits(1, 2, 3)
            },
        );
        let auth = StoreAuth::open(store, config()).await.unwrap();
        auth.del_user("abc").await.unwrap();
        auth.del_user("abc").await.unwrap();
        assert!(auth.store().row("abc").is_none());

        auth.store()
            .save_user(&UserRecord::new("def").with_limits(5, 5, 5))
            .await
            .unwrap();
        auth.add_user("def").await.unwrap();
        let user = auth.memory().get("def").unwrap();
        assert_eq!(user.get_ip_limit(), 5);
        assert_eq!(auth.store().row("def").unwrap().send_limit, 5);

        assert!(matches!(
            auth.add_user("").await,
            Err(AuthError::InvalidInput(_))
        ));
        auth.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_set_user_limits() {
        let auth = StoreAuth::open(MapStore::default(), config()).await.unwrap();
        auth.add_user("abc").await.unwrap();
        auth.memory().get("abc").unwrap().add_traffic(10, 20).await;

        auth.set_user_limits("abc", 100, 200, 2).await.unwrap();
        let row = auth.store().row("abc").unwrap();
        assert_eq!((row.send_limit, row.recv_limit, row.max_ip_num), (100, 200, 2));
        assert_eq!((row.sent, row.recv), (10, 20));
        assert_eq!(auth.memory().get("abc").unwrap().get_ip_limit(), 2);

        assert!(matches!(
            auth.set_user_limits("missing", 1, 1, 1).await,
            Err(AuthError::NotFound)
        ));
        auth.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_flush() {
        let auth = StoreAuth::open(MapStore::default(), config()).await.unwrap();
        auth.add_user("abc").await.unwrap();
        auth.memory().get("abc").unwrap().add_traffic(1, 2).await;

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let row = auth.store().row("abc").unwrap();
        assert_eq!((row.sent, row.recv), (1, 2));
        auth.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_flushes_and_closes_store() {
        let auth = StoreAuth::open(MapStore::default(), config()).await.unwrap();
        auth.add_user("abc").await.unwrap();
        let user = auth.auth_user("abc").await.unwrap().unwrap();
        user.add_traffic(3, 4).await;
        assert!(user.add_ip("1.1.1.1".parse().unwrap()));

        auth.close().await.unwrap();
        assert!(auth.store().closed.load(Ordering::SeqCst));
        let row = auth.store().rows.lock().get("abc").cloned().unwrap();
        assert_eq!((row.sent, row.recv), (3, 4));

        assert!(matches!(auth.auth_user("abc").await, Err(AuthError::Closed)));
        assert!(matches!(auth.add_user("x").await, Err(AuthError::Closed)));
        // Closing twice is harmless
        auth.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_live_limit_changes_survive_sync() {
        let config = StoreAuthConfig::default().check_interval(Duration::from_secs(3600));
        let auth = StoreAuth::open(MapStore::default(), config).await.unwrap();
        auth.add_user("abc").await.unwrap();
        let user = auth.auth_user("abc").await.unwrap().unwrap();

        user.set_speed_limit(1000, 2000);
        user.set_ip_limit(2);
        auth.sync().await.unwrap();
        assert_eq!(user.get_speed_limit(), (1000, 2000));
        assert_eq!(user.get_ip_limit(), 2);
        let row = auth.store().load_user("abc").await.unwrap();
        assert_eq!(row.limits(), (1000, 2000, 2));

        // A later edit in the store still reaches the live user
        auth.store().save_user(&row.with_limits(5, 6, 7)).await.unwrap();
        auth.sync().await.unwrap();
        assert_eq!(user.get_speed_limit(), (5, 6));
        assert_eq!(user.get_ip_limit(), 7);
        auth.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_del_user_during_sync_stays_deleted() {
        let store = MapStore {
            list_delay: Some(Duration::from_millis(200)),
            ..MapStore::with_rows([UserRecord::new("abc")])
        };
        let config = StoreAuthConfig::default().check_interval(Duration::from_secs(3600));
        let auth = Arc::new(StoreAuth::open(store, config).await.unwrap());

        let syncing = tokio::spawn({
            let auth = auth.clone();
            async move { auth.sync().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        auth.del_user("abc").await.unwrap();
        syncing.await.unwrap().unwrap();

        assert!(auth.auth_user("abc").await.unwrap().is_none());
        assert!(auth.store().row("abc").is_none());
        auth.sync().await.unwrap();
        assert!(auth.auth_user("abc").await.unwrap().is_none());
        auth.close().await.unwrap();
    }
}
