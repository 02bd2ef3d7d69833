//! Generic durable user storage.
//!
//! This module provides:
//!
//! - [`UserRecord`] — one persisted user: counters and limits
//! - [`UserStore`] — persistence contract (implement this for new engines)
//! - [`StoreAuth`] — authenticator that keeps live users in memory and
//!   periodically flushes their counters to a `UserStore`
//! - [`StoreAuthConfig`] — flush loop settings
//!
//! # Adding a new engine
//!
//! ```ignore
//! use trojan_statistic::store::{StoreAuth, StoreAuthConfig, UserRecord, UserStore};
//!
//! struct MyStore { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl UserStore for MyStore {
//!     async fn save_user(&self, record: &UserRecord) -> Result<(), AuthError> { todo!() }
//!     // ...
//! }
//!
//! let auth = StoreAuth::open(MyStore { .. }, StoreAuthConfig::default()).await?;
//! ```

mod auth;
mod config;
mod record;
mod traits;

pub use auth::StoreAuth;
pub use config::StoreAuthConfig;
pub use record::{COUNTER_WIDTH, UserRecord, decode_counter, encode_counter};
pub use traits::{UserStore, UserVisitor};
