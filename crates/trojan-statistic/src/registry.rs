//! Name-to-constructor registry for authenticators.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};
use trojan_config::Context;

use crate::error::AuthError;
use crate::traits::Authenticator;

/// Future returned by an [`AuthCreator`].
pub type CreatorFuture =
    Pin<Box<dyn Future<Output = Result<Arc<dyn Authenticator>, AuthError>> + Send + 'static>>;

/// Type-erased authenticator constructor.
pub type AuthCreator = Arc<dyn Fn(Context) -> CreatorFuture + Send + Sync + 'static>;

/// Table of authenticator constructors, keyed by case-insensitive name.
///
/// Built once at startup, populated by each backend's `register` function,
/// and consulted when configuration names the backend to use.
///
/// # Example
///
/// ```
/// use trojan_statistic::{AuthError, AuthRegistry};
/// use trojan_config::Context;
///
/// # async fn example() -> Result<(), AuthError> {
/// let registry = AuthRegistry::with_builtin();
/// let auth = registry.create(&Context::new(), "memory").await?;
/// assert!(auth.auth_user("unknown").await?.is_none());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct AuthRegistry {
    creators: HashMap<String, AuthCreator>,
}

impl AuthRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every backend compiled into this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::memory::register(&mut registry);
        #[cfg(feature = "redis")]
        crate::redis::register(&mut registry);
        #[cfg(feature = "sqlite")]
        crate::sqlite::register(&mut registry);
        registry
    }

    /// Register a creator under `name`. A later registration of the same
    /// name replaces the earlier one.
    pub fn register<F, Fut>(&mut self, name: &str, creator: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Authenticator>, AuthError>> + Send + 'static,
    {
        let creator: AuthCreator = Arc::new(move |ctx| Box::pin(creator(ctx)));
        let key = name.to_ascii_lowercase();
        if self.creators.insert(key.clone(), creator).is_some() {
            debug!(backend = %key, "authenticator creator replaced");
        }
        self
    }

    /// Registered backend names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.creators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.creators.contains_key(&name.to_ascii_lowercase())
    }

    /// Build the authenticator registered under `name`.
    ///
    /// Fails with [`AuthError::BackendNotFound`] without constructing
    /// anything if the name is unknown; a creator's own failure is wrapped
    /// in [`AuthError::Create`].
    pub async fn create(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Arc<dyn Authenticator>, AuthError> {
        let key = name.to_ascii_lowercase();
        let creator = self
            .creators
            .get(&key)
            .cloned()
            .ok_or_else(|| AuthError::BackendNotFound(name.to_string()))?;

        let auth = creator(ctx.clone())
            .await
            .map_err(|source| AuthError::Create {
                backend: key.clone(),
                source: Box::new(source),
            })?;
        info!(backend = %key, capabilities = ?auth.capabilities(), "authenticator created");
        Ok(auth)
    }
}

impl std::fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
