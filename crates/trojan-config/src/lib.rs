//! Configuration registry and execution context.
//!
//! Components own their configuration shape: each registers a section type
//! with a [`ConfigRegistry`], a configuration document is bound into a
//! [`Context`], and components later pull their section back out by name
//! without the context knowing any of their types.

mod context;
pub mod defaults;
mod loader;
mod registry;

pub use context::Context;
pub use loader::{ConfigError, Format, read_config};
pub use registry::ConfigRegistry;

pub use tokio_util::sync::CancellationToken;
