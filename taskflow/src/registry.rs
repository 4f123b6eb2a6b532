//! Job type to handler mapping.

use crate::handler::{BoxedHandler, Handler};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Immutable view of the registry taken when the worker pool starts.
pub type HandlerSnapshot = Arc<HashMap<String, BoxedHandler>>;

/// Maps job types to handlers.
///
/// Registration replaces any earlier handler for the same type. The lock
/// only guards registration; workers dispatch through a [`snapshot`]
/// taken at start.
///
/// [`snapshot`]: HandlerRegistry::snapshot
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, BoxedHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `job_type`, replacing any previous handler.
    pub fn register<H>(&self, job_type: impl Into<String>, handler: H)
    where
        H: Handler + 'static,
    {
        self.register_boxed(job_type, Arc::new(handler));
    }

    /// Register an already shared handler, e.g. the output of
    /// [`chain`](crate::handler::chain).
    pub fn register_boxed(&self, job_type: impl Into<String>, handler: BoxedHandler) {
        let job_type = job_type.into();
        let replaced = self.handlers.write().insert(job_type.clone(), handler);
        if replaced.is_some() {
            warn!(job_type = %job_type, "handler replaced");
        } else {
            debug!(job_type = %job_type, "handler registered");
        }
    }

    /// Look up the handler for `job_type`.
    #[must_use]
    pub fn get(&self, job_type: &str) -> Option<BoxedHandler> {
        self.handlers.read().get(job_type).cloned()
    }

    /// Registered job types, sorted.
    #[must_use]
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort_unstable();
        types
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Copy the current mapping.
    #[must_use]
    pub fn snapshot(&self) -> HandlerSnapshot {
        Arc::new(self.handlers.read().clone())
    }
}
