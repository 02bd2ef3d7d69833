//! Redis coordinated backend.
//!
//! Counters live in the server so any number of relays can share them. Each
//! user is one hash:
//!
//! ```text
//! HGETALL trojan:user:<hash>
//! 1) "upload"    2) "1024"
//! 3) "download"  4) "8192"
//! ```
//!
//! `upload` counts bytes received from the client, `download` bytes sent to
//! it. Speed and IP limits are not enforced; see [`REDIS_CAPABILITIES`].

mod backend;
mod config;
mod scripts;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use trojan_config::{ConfigRegistry, Context};

use crate::error::AuthError;
use crate::registry::AuthRegistry;
use crate::traits::Authenticator;

pub use backend::{REDIS_CAPABILITIES, RedisAuth, RedisUser};
pub use config::{RedisConfig, RedisSection};

/// Registry name of this backend and of its config section.
pub const NAME: &str = "redis";

/// Register the `redis` config section.
pub fn register_config(registry: &mut ConfigRegistry) {
    registry.register::<RedisSection>(NAME);
}

/// Register the `redis` authenticator creator.
pub fn register(registry: &mut AuthRegistry) {
    registry.register(NAME, |ctx: Context| async move {
        let section = ctx.from_config::<RedisSection>(NAME).unwrap_or_default();
        let auth = RedisAuth::connect(&section.redis, ctx.shutdown_token().child_token()).await?;
        Ok::<_, AuthError>(Arc::new(auth) as Arc<dyn Authenticator>)
    });
}
