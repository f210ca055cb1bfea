//! Registry of task handlers keyed by task key

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::context::Context;
use crate::task::Task;

/// Handler execution result
pub type HandlerResult = anyhow::Result<()>;

/// Type-erased handler function
///
/// The context carries the task's timeout; handlers are expected to observe
/// it; the pool never aborts a running handler.
pub type TaskHandler = Arc<
    dyn Fn(Context, Task) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync,
>;

/// Registry of handlers
///
/// Lookups take a read lock, so handlers may be registered while a pool is
/// running; workers see a new handler from their next task on.
///
/// # Example
///
/// ```
/// use workpool::HandlerRegistry;
///
/// let registry = HandlerRegistry::new();
/// registry.register("echo", |_ctx, task| async move {
///     println!("{:?}", task.payload());
///     Ok(())
/// });
/// assert!(registry.contains("echo"));
/// ```
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, TaskHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an async handler for `key`, replacing any previous one
    pub fn register<F, Fut>(&self, key: impl Into<String>, handler: F)
    where
        F: Fn(Context, Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: TaskHandler = Arc::new(move |ctx, task| Box::pin(handler(ctx, task)));
        self.insert(key, handler);
    }

    /// Register an already type-erased handler
    pub fn insert(&self, key: impl Into<String>, handler: TaskHandler) {
        self.handlers.write().insert(key.into(), handler);
    }

    /// Remove the handler for `key`, returning whether one was registered
    pub fn remove(&self, key: &str) -> bool {
        self.handlers.write().remove(key).is_some()
    }

    /// Look up the handler for `key`
    pub fn get(&self, key: &str) -> Option<TaskHandler> {
        self.handlers.read().get(key).cloned()
    }

    /// Check if a handler is registered for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.handlers.read().contains_key(key)
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_invoke() {
        let registry = HandlerRegistry::new();
        registry.register("double", |_ctx, task| async move {
            anyhow::ensure!(task.payload() == b"ok", "unexpected payload");
            Ok(())
        });

        let handler = registry.get("double").expect("handler registered");
        let ok = handler(Context::background(), Task::new("double", []).with_payload("ok")).await;
        assert!(ok.is_ok());

        let err = handler(Context::background(), Task::new("double", [])).await;
        assert_eq!(err.unwrap_err().to_string(), "unexpected payload");
    }

    #[test]
    fn test_lookup_missing() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("missing").is_none());
        assert!(!registry.contains("missing"));
    }

    #[test]
    fn test_replace_and_remove() {
        let registry = HandlerRegistry::new();
        registry.register("a", |_ctx, _task| async { Ok(()) });
        registry.register("a", |_ctx, _task| async { Ok(()) });
        registry.register("b", |_ctx, _task| async { Ok(()) });

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.keys(), vec!["a".to_string(), "b".to_string()]);

        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registries_are_independent() {
        let first = HandlerRegistry::new();
        let second = HandlerRegistry::new();
        first.register("only_here", |_ctx, _task| async { Ok(()) });

        assert!(first.contains("only_here"));
        assert!(!second.contains("only_here"));
    }
}
