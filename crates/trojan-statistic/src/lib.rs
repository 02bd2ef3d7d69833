//! Per-user accounting and access control for trojan relays.
//!
//! The relay depends only on the capability traits: it asks an
//! [`Authenticator`] for a [`User`] by identity hash, records traffic with
//! [`TrafficMeter::add_traffic`] and registers connections with
//! [`IpRecorder::add_ip`] / [`IpRecorder::del_ip`] (or an [`IpGuard`]).
//! Which backend answers is decided at runtime through an [`AuthRegistry`].
//!
//! Backends:
//!
//! - [`memory`] — process-local users, full semantics, nothing persisted
//! - `sqlite` — durable users with periodic counter flushes (feature `sqlite`)
//! - `redis` — counters shared between relays (feature `redis`)
//!
//! # Example
//!
//! ```
//! use trojan_statistic::{AuthRegistry, sha224_hex};
//! use trojan_config::{ConfigRegistry, Context};
//!
//! # async fn example() -> Result<(), trojan_statistic::AuthError> {
//! let mut config = ConfigRegistry::new();
//! trojan_statistic::register_config(&mut config);
//! let ctx = config.with_yaml(&Context::new(), b"memory:\n  passwords: [my_password]\n")?;
//!
//! let auth = AuthRegistry::with_builtin().create(&ctx, "memory").await?;
//! let user = auth.auth_user(&sha224_hex("my_password")).await?.expect("known user");
//! user.add_traffic(1024, 4096).await;
//! assert_eq!(user.get_traffic().await?, (1024, 4096));
//! # ctx.cancel();
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod guard;
mod hash;
mod limiter;
mod registry;
mod traits;

pub mod memory;
pub mod store;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{STATISTICS, StatisticsConfig, StatisticsSection, register_config};
pub use error::AuthError;
pub use guard::{IpGuard, admit_ip};
pub use hash::{sha224_hex, verify_password};
pub use limiter::SpeedLimiter;
pub use memory::{MemoryAuth, MemoryUser};
pub use registry::{AuthCreator, AuthRegistry, CreatorFuture};
pub use traits::{Authenticator, Capabilities, IpRecorder, TrafficMeter, User};
