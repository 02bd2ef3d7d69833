//! In-memory backend.
//!
//! - [`MemoryUser`] — the reference user: atomic counters, speed measurement,
//!   token-bucket speed limits and a reference-counted IP table
//! - [`MemoryAuth`] — authenticator holding users in a shared map
//!
//! Registered as `memory`. Users come from the `memory` config section:
//!
//! ```yaml
//! memory:
//!   users: ["<sha224 hex>"]
//!   passwords: ["plaintext"]
//! ```

mod auth;
mod user;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trojan_config::{ConfigRegistry, Context, defaults};

use crate::hash::sha224_hex;
use crate::registry::AuthRegistry;
use crate::traits::Authenticator;

pub use auth::MemoryAuth;
pub use user::MemoryUser;

/// Registry name of this backend and of its config section.
pub const NAME: &str = "memory";

/// Top-level document shape for the `memory` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub memory: MemoryConfig,
}

/// Users pre-loaded into a [`MemoryAuth`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Identity hashes.
    pub users: Vec<String>,
    /// Plaintext passwords, hashed with [`sha224_hex`].
    pub passwords: Vec<String>,
}

impl MemoryAuth {
    /// Build from a config section.
    pub fn from_config(config: &MemoryConfig) -> Self {
        let hashes = config
            .users
            .iter()
            .cloned()
            .chain(config.passwords.iter().map(|p| sha224_hex(p)));
        Self::from_hashes(hashes)
    }
}

/// Register the `memory` config section.
pub fn register_config(registry: &mut ConfigRegistry) {
    registry.register::<MemorySection>(NAME);
}

/// Register the `memory` authenticator creator.
pub fn register(registry: &mut AuthRegistry) {
    registry.register(NAME, |ctx: Context| async move {
        let section = ctx.from_config::<MemorySection>(NAME).unwrap_or_default();
        let auth = MemoryAuth::from_config(&section.memory)
            .with_shutdown(ctx.shutdown_token().child_token());
        auth.spawn_speed_updater(
            Duration::from_millis(defaults::DEFAULT_SPEED_WINDOW_MS),
            auth.shutdown_token(),
        );
        Ok(Arc::new(auth) as Arc<dyn Authenticator>)
    });
}
