//! Configuration sections owned by this crate.

use serde::{Deserialize, Serialize};
use trojan_config::{ConfigRegistry, defaults};

/// Name of the relay-wide statistics section.
pub const STATISTICS: &str = "statistics";

/// Top-level document shape for the `statistics` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsSection {
    pub statistics: StatisticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Register connected client IPs with users (and so enforce IP limits).
    pub track_client_ip: bool,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            track_client_ip: defaults::DEFAULT_TRACK_CLIENT_IP,
        }
    }
}

/// Register every section of this crate: `statistics` plus one per
/// compiled-in backend.
pub fn register_config(registry: &mut ConfigRegistry) {
    registry.register::<StatisticsSection>(STATISTICS);
    crate::memory::register_config(registry);
    #[cfg(feature = "redis")]
    crate::redis::register_config(registry);
    #[cfg(feature = "sqlite")]
    crate::sqlite::register_config(registry);
}

#[cfg(test)]
mod tests {
    use trojan_config::Context;

    use super::*;

    #[test]
    fn test_track_client_ip_defaults_on() {
        assert!(StatisticsConfig::default().track_client_ip);

        let mut registry = ConfigRegistry::new();
        register_config(&mut registry);
        let ctx = registry
            .with_json(&Context::new(), br#"{"memory": {"users": []}}"#)
            .unwrap();
        let section = ctx.from_config::<StatisticsSection>(STATISTICS).unwrap();
        assert!(section.statistics.track_client_ip);
    }

    #[test]
    fn test_every_section_registered() {
        let mut registry = ConfigRegistry::new();
        register_config(&mut registry);
        assert!(registry.is_registered(STATISTICS));
        assert!(registry.is_registered(crate::memory::NAME));
        #[cfg(feature = "redis")]
        assert!(registry.is_registered("redis"));
        #[cfg(feature = "sqlite")]
        assert!(registry.is_registered("sqlite"));
    }
}
