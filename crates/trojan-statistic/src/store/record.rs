//! Persisted form of a user.

use crate::error::AuthError;
use crate::memory::MemoryUser;
use crate::traits::{IpRecorder, TrafficMeter};

/// On-disk width of a traffic counter.
pub const COUNTER_WIDTH: usize = 8;

/// One row of a [`UserStore`](super::UserStore).
///
/// Limits use `0` for "unlimited".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub hash: String,
    /// Cumulative bytes sent.
    pub sent: u64,
    /// Cumulative bytes received.
    pub recv: u64,
    pub max_ip_num: usize,
    /// Bytes per second.
    pub send_limit: u64,
    /// Bytes per second.
    pub recv_limit: u64,
}

impl UserRecord {
    /// A record with zero counters and no limits.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ..Self::default()
        }
    }

    /// Builder: set limits.
    pub fn with_limits(mut self, send_limit: u64, recv_limit: u64, max_ip_num: usize) -> Self {
        self.send_limit = send_limit;
        self.recv_limit = recv_limit;
        self.max_ip_num = max_ip_num;
        self
    }

    /// `(send_limit, recv_limit, max_ip_num)`.
    #[inline]
    pub fn limits(&self) -> (u64, u64, usize) {
        (self.send_limit, self.recv_limit, self.max_ip_num)
    }

    /// Snapshot a live user.
    pub fn from_user(user: &MemoryUser) -> Self {
        let (sent, recv) = user.traffic();
        let (send_limit, recv_limit) = user.get_speed_limit();
        Self {
            hash: user.hash().to_string(),
            sent,
            recv,
            max_ip_num: user.get_ip_limit(),
            send_limit,
            recv_limit,
        }
    }

    /// Materialize a live user carrying this record's counters and limits.
    pub fn into_user(self) -> MemoryUser {
        MemoryUser::new(self.hash)
            .with_traffic(self.sent, self.recv)
            .with_speed_limit(self.send_limit, self.recv_limit)
            .with_ip_limit(self.max_ip_num)
    }

    /// Apply this record's limits to a live user, leaving its counters alone.
    pub fn apply_limits(&self, user: &MemoryUser) {
        if user.get_speed_limit() != (self.send_limit, self.recv_limit) {
            user.set_speed_limit(self.send_limit, self.recv_limit);
        }
        user.set_ip_limit(self.max_ip_num);
    }
}

/// Encode a counter as 8 big-endian bytes.
#[inline]
pub fn encode_counter(value: u64) -> [u8; COUNTER_WIDTH] {
    value.to_be_bytes()
}

/// Decode a counter written by [`encode_counter`].
///
/// A blob of any other width is corrupt and reported as a backend error.
pub fn decode_counter(blob: &[u8]) -> Result<u64, AuthError> {
    let bytes: [u8; COUNTER_WIDTH] = blob.try_into().map_err(|_| {
        AuthError::Backend(format!(
            "counter blob is {} bytes, expected {COUNTER_WIDTH}",
            blob.len()
        ))
    })?;
    Ok(u64::from_be_bytes(bytes))
}
