//! Token-bucket speed limiting.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Byte-rate limiter with a one-second burst.
///
/// `reserve` never blocks: it debits the bucket (possibly below zero) and
/// returns how long the caller must wait before the debited bytes are paid
/// for. A rate of `0` disables limiting.
#[derive(Debug)]
pub struct SpeedLimiter {
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    /// Bytes per second (0 = unlimited).
    rate: u64,
    /// Available bytes; negative while callers are waiting.
    tokens: f64,
    last: Instant,
}

impl SpeedLimiter {
    /// Create a limiter allowing `rate` bytes per second.
    pub fn new(rate: u64) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                rate,
                tokens: rate as f64,
                last: Instant::now(),
            }),
        }
    }

    #[inline]
    pub fn rate(&self) -> u64 {
        self.bucket.lock().rate
    }

    /// Change the rate; the bucket refills to the new burst.
    pub fn set_rate(&self, rate: u64) {
        let mut bucket = self.bucket.lock();
        bucket.rate = rate;
        bucket.tokens = rate as f64;
        bucket.last = Instant::now();
    }

    /// Debit `bytes` and return the delay the caller must observe.
    pub fn reserve(&self, bytes: u64) -> Duration {
        let mut bucket = self.bucket.lock();
        if bucket.rate == 0 || bytes == 0 {
            return Duration::ZERO;
        }

        let now = Instant::now();
        let rate = bucket.rate as f64;
        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(rate);
        bucket.last = now;

        bucket.tokens -= bytes as f64;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / rate)
        }
    }

    /// Debit `bytes` and sleep until they are paid for.
    pub async fn wait(&self, bytes: u64) {
        let delay = self.reserve(bytes);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for SpeedLimiter {
    fn default() -> Self {
        Self::new(0)
    }
}
