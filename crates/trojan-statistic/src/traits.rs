//! Capability traits shared by every backend.
//!
//! The relay only ever sees these traits: a [`User`] is anything that is
//! both a [`TrafficMeter`] and an [`IpRecorder`], and an [`Authenticator`]
//! hands out `User` handles for identity hashes.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AuthError;

/// Which limits and operations a backend actually enforces.
///
/// Operations a backend does not support are documented no-ops that return
/// harmless defaults; callers that need enforcement check this first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Byte counters are recorded and readable.
    pub traffic: bool,
    /// Speed is measured and `set_speed_limit` throttles traffic.
    pub speed_limit: bool,
    /// Connected IPs are tracked and `set_ip_limit` is enforced.
    pub ip_limit: bool,
    /// `add_user` / `del_user` / `list_users` operate on the backend.
    pub user_management: bool,
}

impl Capabilities {
    /// Every capability.
    pub const FULL: Self = Self {
        traffic: true,
        speed_limit: true,
        ip_limit: true,
        user_management: true,
    };
}

/// Byte accounting, speed measurement and speed limiting.
///
/// Implementations must be thread-safe: a single user may be shared by many
/// concurrent connections.
#[async_trait]
pub trait TrafficMeter: Send + Sync {
    /// Identity hash this meter is bound to.
    fn hash(&self) -> &str;

    /// Record relayed bytes.
    ///
    /// Never fails from the caller's perspective: a backend that cannot
    /// record the update logs it and drops it. Backends that enforce speed
    /// limits may delay the return to throttle the connection.
    async fn add_traffic(&self, sent: u64, recv: u64);

    /// Cumulative `(sent, recv)` bytes.
    async fn get_traffic(&self) -> Result<(u64, u64), AuthError>;

    /// Atomically zero the counters and return the totals they held.
    async fn get_and_reset_traffic(&self) -> Result<(u64, u64), AuthError>;

    /// Same as [`get_and_reset_traffic`](Self::get_and_reset_traffic).
    #[inline]
    async fn reset_traffic(&self) -> Result<(u64, u64), AuthError> {
        self.get_and_reset_traffic().await
    }

    /// Current `(send, recv)` speed in bytes per second.
    fn get_speed(&self) -> (u64, u64);

    /// Set `(send, recv)` limits in bytes per second; `0` means unlimited.
    fn set_speed_limit(&self, send: u64, recv: u64);

    /// Current `(send, recv)` limits in bytes per second.
    fn get_speed_limit(&self) -> (u64, u64);

    fn capabilities(&self) -> Capabilities;
}

/// Tracking and limiting of concurrently connected source IPs.
pub trait IpRecorder: Send + Sync {
    /// Register a connection from `ip`.
    ///
    /// Returns `false` if admitting a new distinct IP would exceed the limit.
    /// A connection from an already-connected IP is always admitted.
    fn add_ip(&self, ip: IpAddr) -> bool;

    /// Unregister a connection from `ip`; returns whether it was registered.
    fn del_ip(&self, ip: IpAddr) -> bool;

    /// Number of distinct connected IPs.
    fn get_ip(&self) -> usize;

    /// Set the maximum number of distinct IPs; `0` means unlimited.
    fn set_ip_limit(&self, max: usize);

    fn get_ip_limit(&self) -> usize;
}

/// A user: the union of both capabilities.
pub trait User: TrafficMeter + IpRecorder {}

impl<T: TrafficMeter + IpRecorder + ?Sized> User for T {}

/// Gateway from identity hashes to live [`User`] handles.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Look up a user.
    ///
    /// An unknown hash is `Ok(None)`, not an error. Errors are reserved for
    /// backend failures.
    async fn auth_user(&self, hash: &str) -> Result<Option<Arc<dyn User>>, AuthError>;

    /// Create a user with default limits. Existing users are left untouched.
    async fn add_user(&self, hash: &str) -> Result<(), AuthError>;

    /// Permanently remove a user. Removing an unknown user is not an error.
    async fn del_user(&self, hash: &str) -> Result<(), AuthError>;

    /// Every known user.
    async fn list_users(&self) -> Result<Vec<Arc<dyn User>>, AuthError>;

    fn capabilities(&self) -> Capabilities;

    /// Release backend resources. Later calls may fail with [`AuthError::Closed`].
    async fn close(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Blanket implementation for `Arc<A>` where `A: Authenticator`.
#[async_trait]
impl<A: Authenticator + ?Sized> Authenticator for Arc<A> {
    #[inline]
    async fn auth_user(&self, hash: &str) -> Result<Option<Arc<dyn User>>, AuthError> {
        (**self).auth_user(hash).await
    }

    #[inline]
    async fn add_user(&self, hash: &str) -> Result<(), AuthError> {
        (**self).add_user(hash).await
    }

    #[inline]
    async fn del_user(&self, hash: &str) -> Result<(), AuthError> {
        (**self).del_user(hash).await
    }

    #[inline]
    async fn list_users(&self) -> Result<Vec<Arc<dyn User>>, AuthError> {
        (**self).list_users().await
    }

    #[inline]
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    #[inline]
    async fn close(&self) -> Result<(), AuthError> {
        (**self).close().await
    }
}

/// Blanket implementation for `Box<A>` where `A: Authenticator`.
#[async_trait]
impl<A: Authenticator + ?Sized> Authenticator for Box<A> {
    #[inline]
    async fn auth_user(&self, hash: &str) -> Result<Option<Arc<dyn User>>, AuthError> {
        (**self).auth_user(hash).await
    }

    #[inline]
    async fn add_user(&self, hash: &str) -> Result<(), AuthError> {
        (**self).add_user(hash).await
    }

    #[inline]
    async fn del_user(&self, hash: &str) -> Result<(), AuthError> {
        (**self).del_user(hash).await
    }

    #[inline]
    async fn list_users(&self) -> Result<Vec<Arc<dyn User>>, AuthError> {
        (**self).list_users().await
    }

    #[inline]
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    #[inline]
    async fn close(&self) -> Result<(), AuthError> {
        (**self).close().await
    }
}
