//! SQLite durable backend.
//!
//! Users live in a single table keyed by identity hash; counters are
//! fixed-width big-endian blobs so they read back identically on every
//! platform. [`SqliteAuth`] keeps live users in memory and flushes their
//! counters every `check_interval_secs`.
//!
//! # Example
//!
//! ```ignore
//! use trojan_statistic::sqlite::{SqliteAuth, SqliteConfig};
//! use trojan_config::CancellationToken;
//!
//! let config = SqliteConfig::new("/var/lib/trojan/users.db").max_connections(4);
//! let auth = SqliteAuth::connect(&config, CancellationToken::new()).await?;
//! ```
//!
//! # Database Schema
//!
//! Created on connect if missing:
//!
//! ```sql
//! CREATE TABLE users (
//!     hash TEXT PRIMARY KEY NOT NULL,
//!     sent BLOB NOT NULL,             -- u64, 8 bytes big-endian
//!     recv BLOB NOT NULL,             -- u64, 8 bytes big-endian
//!     max_ip_num INTEGER NOT NULL DEFAULT 0,
//!     send_limit INTEGER NOT NULL DEFAULT 0,  -- bytes/s, 0 = unlimited
//!     recv_limit INTEGER NOT NULL DEFAULT 0
//! );
//! ```

mod config;
mod queries;
mod store;


use std::sync::Arc;

use trojan_config::{ConfigRegistry, Context};

use crate::error::AuthError;
use crate::registry::AuthRegistry;
use crate::traits::Authenticator;

pub use config::{SqliteConfig, SqliteSection};
pub use store::{SqliteAuth, SqliteStore};

/// Registry name of this backend and of its config section.
pub const NAME: &str = "sqlite";

/// Register the `sqlite` config section.
pub fn register_config(registry: &mut ConfigRegistry) {
    registry.register::<SqliteSection>(NAME);
}

/// Register the `sqlite` authenticator creator.
///
/// The authenticator stops with the context's shutdown token.
pub fn register(registry: &mut AuthRegistry) {
    registry.register(NAME, |ctx: Context| async move {
        let section = ctx.from_config::<SqliteSection>(NAME).unwrap_or_default();
        let auth = SqliteAuth::connect(&section.sqlite, ctx.shutdown_token().child_token()).await?;
        Ok::<_, AuthError>(Arc::new(auth) as Arc<dyn Authenticator>)
    });
}
