//! Handler registry for dispatching calls by method name.
//!
//! The registry maps method names to a handler and its [`ExecutionMode`], and
//! holds a single optional fallback. Both live behind one reader/writer lock:
//! dispatch takes the read side, registration the write side, and neither
//! holds the lock while a handler runs.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ExecutionMode, FallbackHandler, MethodHandler};

/// A registered handler and how to run it.
#[derive(Clone)]
pub struct Registration {
    pub handler: Arc<dyn MethodHandler>,
    pub mode: ExecutionMode,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Where an inbound call goes.
pub enum Route {
    /// A per-method registration matched.
    Method(Registration),
    /// Nothing matched, the fallback takes it.
    Fallback(Arc<dyn FallbackHandler>),
    /// Nothing matched and there is no fallback.
    Unhandled,
}

#[derive(Default)]
struct RegistryState {
    methods: HashMap<String, Registration>,
    fallback: Option<Arc<dyn FallbackHandler>>,
}

/// Registry mapping method names to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    state: RwLock<RegistryState>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `name`, replacing any previous registration.
    ///
    /// `None` removes the registration.
    pub fn register(
        &self,
        name: &str,
        handler: Option<Arc<dyn MethodHandler>>,
        mode: ExecutionMode,
    ) {
        let mut state = self.state.write();
        match handler {
            Some(handler) => {
                state
                    .methods
                    .insert(name.to_string(), Registration { handler, mode });
            }
            None => {
                state.methods.remove(name);
            }
        }
    }

    /// Replace the fallback handler. `None` clears it.
    pub fn register_fallback(&self, handler: Option<Arc<dyn FallbackHandler>>) {
        self.state.write().fallback = handler;
    }

    /// Resolve the route for a call to `method`.
    pub fn route(&self, method: &str) -> Route {
        let state = self.state.read();
        if let Some(registration) = state.methods.get(method) {
            return Route::Method(registration.clone());
        }
        match &state.fallback {
            Some(fallback) => Route::Fallback(fallback.clone()),
            None => Route::Unhandled,
        }
    }

    /// Get the execution mode of a registered method.
    pub fn get_mode(&self, name: &str) -> Option<ExecutionMode> {
        self.state.read().methods.get(name).map(|r| r.mode)
    }

    /// Whether `name` has a per-method registration.
    pub fn contains(&self, name: &str) -> bool {
        self.state.read().methods.contains_key(name)
    }

    /// Whether a fallback handler is set.
    pub fn has_fallback(&self) -> bool {
        self.state.read().fallback.is_some()
    }

    /// Number of per-method registrations.
    pub fn len(&self) -> usize {
        self.state.read().methods.len()
    }

    /// Whether no method is registered. The fallback is not counted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
