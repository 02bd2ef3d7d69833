//! Execution context carrying bound configuration sections and the process lifetime.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// A bound, type-erased configuration section.
pub(crate) type Section = Arc<dyn Any + Send + Sync>;

/// Shared execution context.
///
/// Holds every configuration section bound by a
/// [`ConfigRegistry`](crate::ConfigRegistry) plus a cancellation token that
/// marks the lifetime of whatever components are built from it. Cloning is
/// cheap; deriving a context with new sections never mutates the original.
#[derive(Clone)]
pub struct Context {
    sections: Arc<HashMap<String, Section>>,
    shutdown: CancellationToken,
}

impl Context {
    /// Create an empty context with a fresh lifetime.
    pub fn new() -> Self {
        Self::with_shutdown(CancellationToken::new())
    }

    /// Create an empty context bound to an existing cancellation token.
    pub fn with_shutdown(shutdown: CancellationToken) -> Self {
        Self {
            sections: Arc::new(HashMap::new()),
            shutdown,
        }
    }

    /// Retrieve a bound section.
    ///
    /// Returns `None` if the section was never bound or was bound with a
    /// different type. Callers treat `None` as "use defaults".
    pub fn from_config<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.sections
            .get(&name.to_ascii_lowercase())
            .cloned()
            .and_then(|section| section.downcast::<T>().ok())
    }

    /// Check whether a section is bound under `name`.
    pub fn has_config(&self, name: &str) -> bool {
        self.sections.contains_key(&name.to_ascii_lowercase())
    }

    /// Derive a context with additional sections; existing names are replaced.
    pub(crate) fn with_sections(&self, sections: HashMap<String, Section>) -> Self {
        let mut merged = (*self.sections).clone();
        merged.extend(sections);
        Self {
            sections: Arc::new(merged),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Token cancelled when this context's lifetime ends.
    #[inline]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Derive a context whose lifetime ends with this one or when cancelled itself.
    pub fn child(&self) -> Self {
        Self {
            sections: self.sections.clone(),
            shutdown: self.shutdown.child_token(),
        }
    }

    /// End the lifetime of this context and all of its children.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.sections.keys().collect();
        names.sort();
        f.debug_struct("Context")
            .field("sections", &names)
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}
