//! RAII registration of a connected source IP.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;
use trojan_config::Context;

use crate::config::{STATISTICS, StatisticsSection};
use crate::error::AuthError;
use crate::traits::User;

/// Holds one connection's registration of `ip` on a user.
///
/// Acquiring calls [`add_ip`](crate::IpRecorder::add_ip); dropping calls
/// [`del_ip`](crate::IpRecorder::del_ip), so the IP table stays accurate even
/// if the connection handler returns early or panics.
pub struct IpGuard {
    user: Arc<dyn User>,
    ip: IpAddr,
}

impl IpGuard {
    /// Register a connection from `ip`.
    ///
    /// Fails with [`AuthError::IpLimitExceeded`] if the user already has its
    /// maximum number of distinct IPs connected.
    pub fn acquire(user: Arc<dyn User>, ip: IpAddr) -> Result<Self, AuthError> {
        if !user.add_ip(ip) {
            debug!(hash = %user.hash(), %ip, "connection rejected by ip limit");
            return Err(AuthError::IpLimitExceeded);
        }
        Ok(Self { user, ip })
    }

    #[inline]
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    #[inline]
    pub fn user(&self) -> &Arc<dyn User> {
        &self.user
    }
}

impl Drop for IpGuard {
    fn drop(&mut self) {
        self.user.del_ip(self.ip);
    }
}

impl std::fmt::Debug for IpGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpGuard")
            .field("hash", &self.user.hash())
            .field("ip", &self.ip)
            .finish()
    }
}

/// Admit a connection according to the `statistics` section.
///
/// With `track_client_ip` off this returns `Ok(None)` without touching the
/// user; otherwise it acquires an [`IpGuard`]. An unbound section counts as
/// tracking on.
pub fn admit_ip(
    ctx: &Context,
    user: &Arc<dyn User>,
    ip: IpAddr,
) -> Result<Option<IpGuard>, AuthError> {
    let track = ctx
        .from_config::<StatisticsSection>(STATISTICS)
        .unwrap_or_default()
        .statistics
        .track_client_ip;
    if !track {
        return Ok(None);
    }
    IpGuard::acquire(user.clone(), ip).map(Some)
}
