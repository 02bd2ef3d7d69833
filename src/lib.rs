//! # trojan-stat
//!
//! Accounting and access-control core for trojan relays.
//!
//! ## Crates
//!
//! - [`trojan_config`] - Config registry, execution context and defaults
//! - [`trojan_statistic`] - Capability traits, authenticator registry and backends

pub use trojan_config as config;
pub use trojan_statistic as statistic;

use trojan_config::ConfigRegistry;
use trojan_statistic::AuthRegistry;

/// Config and authenticator registries with every compiled-in section and backend.
pub fn registries() -> (ConfigRegistry, AuthRegistry) {
    let mut config = ConfigRegistry::new();
    trojan_statistic::register_config(&mut config);
    (config, AuthRegistry::with_builtin())
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use trojan_config::{CancellationToken, ConfigRegistry, Context};
    pub use trojan_statistic::{
        AuthError, AuthRegistry, Authenticator, Capabilities, IpGuard, IpRecorder, TrafficMeter,
        User, admit_ip, sha224_hex,
    };

    pub use crate::registries;
}
