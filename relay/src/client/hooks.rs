//! Event-name to callback registry.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked with an event's payload.
pub type Hook = Arc<dyn Fn(Value) + Send + Sync>;

/// Registry mapping event names to hooks.
///
/// Lookups happen per received frame, so hooks registered after the client
/// has started are honored.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Arc<RwLock<HashMap<String, Hook>>>,
}

impl HookRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `event`, replacing any previous hook for it.
    pub fn register<F>(&self, event: impl Into<String>, callback: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let event = event.into();
        tracing::info!(event = %event, "Hook registered");
        self.hooks.write().insert(event, Arc::new(callback));
    }

    /// Invokes the hook registered for `event`.
    ///
    /// Returns `false` if no hook is registered. The hook runs without the
    /// registry lock held, so it may register further hooks.
    pub fn dispatch(&self, event: &str, payload: Value) -> bool {
        let hook = self.hooks.read().get(event).cloned();
        match hook {
            Some(hook) => {
                hook(payload);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if a hook is registered for `event`.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.hooks.read().contains_key(event)
    }

    /// Returns the number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Returns `true` if no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }
}
