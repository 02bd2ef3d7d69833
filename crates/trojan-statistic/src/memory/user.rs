//! Process-local user with full accounting semantics.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::AuthError;
use crate::limiter::SpeedLimiter;
use crate::traits::{Capabilities, IpRecorder, TrafficMeter};

/// A user whose counters, speed and IP table live in process memory.
///
/// Counters are atomics. Increments share `reset_gate` and a reset takes it
/// exclusively, so `get_and_reset_traffic` returns a pair that no racing
/// `add_traffic(sent, recv)` is split across.
/// Speed is derived from a separate window accumulator that
/// [`update_speed`](Self::update_speed) drains, so resets do not disturb it.
#[derive(Debug)]
pub struct MemoryUser {
    hash: String,
    sent: AtomicU64,
    recv: AtomicU64,
    reset_gate: RwLock<()>,
    window_sent: AtomicU64,
    window_recv: AtomicU64,
    send_speed: AtomicU64,
    recv_speed: AtomicU64,
    send_limiter: SpeedLimiter,
    recv_limiter: SpeedLimiter,
    /// Connected IP -> number of open connections from it.
    ips: Mutex<HashMap<IpAddr, usize>>,
    max_ip: AtomicUsize,
}

impl MemoryUser {
    /// Create a user with zero counters and no limits.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            sent: AtomicU64::new(0),
            recv: AtomicU64::new(0),
            reset_gate: RwLock::new(()),
            window_sent: AtomicU64::new(0),
            window_recv: AtomicU64::new(0),
            send_speed: AtomicU64::new(0),
            recv_speed: AtomicU64::new(0),
            send_limiter: SpeedLimiter::default(),
            recv_limiter: SpeedLimiter::default(),
            ips: Mutex::new(HashMap::new()),
            max_ip: AtomicUsize::new(0),
        }
    }

    /// Builder: start from previously persisted counters.
    pub fn with_traffic(self, sent: u64, recv: u64) -> Self {
        self.sent.store(sent, Ordering::Relaxed);
        self.recv.store(recv, Ordering::Relaxed);
        self
    }

    /// Builder: set speed limits.
    pub fn with_speed_limit(self, send: u64, recv: u64) -> Self {
        self.set_speed_limit(send, recv);
        self
    }

    /// Builder: set the IP limit.
    pub fn with_ip_limit(self, max: usize) -> Self {
        self.set_ip_limit(max);
        self
    }

    /// Read the counters without going through the async trait.
    #[inline]
    pub fn traffic(&self) -> (u64, u64) {
        (
            self.sent.load(Ordering::Acquire),
            self.recv.load(Ordering::Acquire),
        )
    }

    /// Turn the bytes accumulated since the last call into a speed.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn update_speed(&self, elapsed: Duration) {
        let sent = self.window_sent.swap(0, Ordering::AcqRel);
        let recv = self.window_recv.swap(0, Ordering::AcqRel);
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return;
        }
        self.send_speed
            .store((sent as f64 / secs) as u64, Ordering::Relaxed);
        self.recv_speed
            .store((recv as f64 / secs) as u64, Ordering::Relaxed);
    }

    /// Snapshot of connected IPs.
    pub fn connected_ips(&self) -> Vec<IpAddr> {
        self.ips.lock().keys().copied().collect()
    }
}

#[async_trait]
impl TrafficMeter for MemoryUser {
    #[inline]
    fn hash(&self) -> &str {
        &self.hash
    }

    async fn add_traffic(&self, sent: u64, recv: u64) {
        {
            let _shared = self.reset_gate.read();
            self.sent.fetch_add(sent, Ordering::AcqRel);
            self.recv.fetch_add(recv, Ordering::AcqRel);
        }
        self.window_sent.fetch_add(sent, Ordering::Relaxed);
        self.window_recv.fetch_add(recv, Ordering::Relaxed);

        tokio::join!(self.send_limiter.wait(sent), self.recv_limiter.wait(recv));
    }

    async fn get_traffic(&self) -> Result<(u64, u64), AuthError> {
        Ok(self.traffic())
    }

    async fn get_and_reset_traffic(&self) -> Result<(u64, u64), AuthError> {
        let _exclusive = self.reset_gate.write();
        Ok((
            self.sent.swap(0, Ordering::AcqRel),
            self.recv.swap(0, Ordering::AcqRel),
        ))
    }

    fn get_speed(&self) -> (u64, u64) {
        (
            self.send_speed.load(Ordering::Relaxed),
            self.recv_speed.load(Ordering::Relaxed),
        )
    }

    fn set_speed_limit(&self, send: u64, recv: u64) {
        self.send_limiter.set_rate(send);
        self.recv_limiter.set_rate(recv);
        debug!(hash = %self.hash, send, recv, "speed limit set");
    }

    fn get_speed_limit(&self) -> (u64, u64) {
        (self.send_limiter.rate(), self.recv_limiter.rate())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }
}

impl IpRecorder for MemoryUser {
    fn add_ip(&self, ip: IpAddr) -> bool {
        let mut ips = self.ips.lock();
        if let Some(count) = ips.get_mut(&ip) {
            *count += 1;
            return true;
        }

        let max = self.max_ip.load(Ordering::Relaxed);
        if max > 0 && ips.len() >= max {
            debug!(hash = %self.hash, %ip, max, "ip limit reached");
            return false;
        }

        ips.insert(ip, 1);
        true
    }

    fn del_ip(&self, ip: IpAddr) -> bool {
        let mut ips = self.ips.lock();
        match ips.get_mut(&ip) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                ips.remove(&ip);
                true
            }
            None => false,
        }
    }

    fn get_ip(&self) -> usize {
        self.ips.lock().len()
    }

    fn set_ip_limit(&self, max: usize) {
        self.max_ip.store(max, Ordering::Relaxed);
    }

    fn get_ip_limit(&self) -> usize {
        self.max_ip.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_traffic_accumulates_and_resets() {
        let user = MemoryUser::new("abc");
        user.add_traffic(100, 200).await;
        user.add_traffic(50, 0).await;
        assert_eq!(user.get_traffic().await.unwrap(), (150, 200));

        assert_eq!(user.get_and_reset_traffic().await.unwrap(), (150, 200));
        assert_eq!(user.get_traffic().await.unwrap(), (0, 0));

        user.add_traffic(1, 2).await;
        assert_eq!(user.reset_traffic().await.unwrap(), (1, 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_traffic_sums() {
        let user = Arc::new(MemoryUser::new("abc"));
        let mut tasks = Vec::new();
        for i in 0..16u64 {
            let user = user.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    user.add_traffic(i, 2 * i).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let expected: u64 = (0..16u64).map(|i| i * 1000).sum();
        assert_eq!(user.get_traffic().await.unwrap(), (expected, 2 * expected));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reset_racing_add_is_exact() {
        let user = Arc::new(MemoryUser::new("abc"));
        let writer = {
            let user = user.clone();
            tokio::spawn(async move {
                for _ in 0..10_000 {
                    user.add_traffic(1, 1).await;
                }
            })
        };

        let mut drained = (0, 0);
        for _ in 0..100 {
            let (s, r) = user.get_and_reset_traffic().await.unwrap();
            assert_eq!(s, r, "reset split an add_traffic call");
            drained.0 += s;
            drained.1 += r;
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        let (s, r) = user.get_and_reset_traffic().await.unwrap();
        assert_eq!((drained.0 + s, drained.1 + r), (10_000, 10_000));
    }

    #[test]
    fn test_ip_limit_scenario() {
        let user = MemoryUser::new("abc").with_ip_limit(2);
        assert!(user.add_ip(ip("1.1.1.1")));
        assert!(user.add_ip(ip("2.2.2.2")));
        assert!(!user.add_ip(ip("3.3.3.3")));

        assert!(user.del_ip(ip("1.1.1.1")));
        assert!(user.add_ip(ip("3.3.3.3")));
        assert_eq!(user.get_ip(), 2);
    }

    #[test]
    fn test_ip_connections_are_counted() {
        let user = MemoryUser::new("abc").with_ip_limit(1);
        assert!(user.add_ip(ip("1.1.1.1")));
        // Same IP, second connection
        assert!(user.add_ip(ip("1.1.1.1")));
        assert!(!user.add_ip(ip("2.2.2.2")));

        assert!(user.del_ip(ip("1.1.1.1")));
        assert_eq!(user.get_ip(), 1);
        assert!(user.del_ip(ip("1.1.1.1")));
        assert_eq!(user.get_ip(), 0);
        assert!(!user.del_ip(ip("1.1.1.1")));
    }

    #[test]
    fn test_zero_ip_limit_is_unlimited() {
        let user = MemoryUser::new("abc");
        for i in 0..=255u8 {
            assert!(user.add_ip(IpAddr::from([10, 0, 0, i])));
        }
        assert_eq!(user.get_ip(), 256);
        assert_eq!(user.connected_ips().len(), 256);
    }

    #[tokio::test]
    async fn test_speed_from_window() {
        let user = MemoryUser::new("abc");
        user.add_traffic(2000, 500).await;
        user.update_speed(Duration::from_secs(2));
        assert_eq!(user.get_speed(), (1000, 250));

        // Reset does not disturb the speed window
        user.add_traffic(300, 300).await;
        user.get_and_reset_traffic().await.unwrap();
        user.update_speed(Duration::from_secs(1));
        assert_eq!(user.get_speed(), (300, 300));

        user.update_speed(Duration::from_secs(1));
        assert_eq!(user.get_speed(), (0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_limit_throttles() {
        let user = MemoryUser::new("abc").with_speed_limit(1000, 0);
        assert_eq!(user.get_speed_limit(), (1000, 0));

        user.add_traffic(1000, 0).await;
        let start = tokio::time::Instant::now();
        user.add_traffic(1000, 5000).await;
        assert!(start.elapsed() >= Duration::from_millis(900));
        assert_eq!(user.get_traffic().await.unwrap(), (2000, 5000));
    }
}
