//! Configuration for [`StoreAuth`](super::StoreAuth).

use std::time::Duration;

use trojan_config::defaults;

/// Settings of the [`StoreAuth`](super::StoreAuth) background loop.
#[derive(Debug, Clone)]
pub struct StoreAuthConfig {
    /// Interval between counter flushes and store rescans.
    pub check_interval: Duration,
    /// Interval between speed measurements of live users.
    pub speed_window: Duration,
}

impl Default for StoreAuthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(defaults::DEFAULT_SQLITE_CHECK_INTERVAL_SECS),
            speed_window: Duration::from_millis(defaults::DEFAULT_SPEED_WINDOW_MS),
        }
    }
}

impl StoreAuthConfig {
    /// Builder: set the flush interval.
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Builder: set the speed window.
    pub fn speed_window(mut self, window: Duration) -> Self {
        self.speed_window = window;
        self
    }
}
