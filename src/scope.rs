//! Scope release notifications
//!
//! Any party can register a callback that is told the string form of a
//! path whenever that path is released.

use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Release callback: receives the released path's string form
pub type ReleaseCallback = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Handle returned by [`ScopeRegistry::register`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    #[inline]
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "callback-{}", self.0)
    }
}

/// Registered release callbacks.
///
/// Callbacks are invoked in registration order; one failing (by error or
/// panic) does not stop the others, failures are reported together.
pub struct ScopeRegistry {
    callbacks: DashMap<CallbackId, ReleaseCallback, RandomState>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self {
            callbacks: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Register a callback
    pub fn register<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        let id = CallbackId::next();
        self.callbacks.insert(id, Arc::new(callback));

        #[cfg(feature = "logging")]
        debug!(
            target: "modular_injector",
            callback = %id,
            "Registered release callback"
        );

        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unregister(&self, id: CallbackId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// Tell every callback that `path` was released.
    pub fn notify_release(&self, path: &str) -> Result<()> {
        // Snapshot first: callbacks may register/unregister while running
        let mut callbacks: Vec<(CallbackId, ReleaseCallback)> = self
            .callbacks
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        callbacks.sort_by_key(|(id, _)| *id);

        let mut failures = Vec::new();
        for (id, callback) in callbacks {
            let failure = match catch_unwind(AssertUnwindSafe(|| callback(path))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(panic) => panic_message(panic.as_ref()),
            };

            #[cfg(feature = "logging")]
            warn!(
                target: "modular_injector",
                callback = %id,
                path,
                error = %failure,
                "Release callback failed"
            );

            failures.push(format!("{id}: {failure}"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::CallbackFailed {
                path: path.to_owned(),
                failures,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn clear(&self) {
        self.callbacks.clear();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_owned()
    }
}

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_callback_ids_unique() {
        let a = CallbackId::next();
        let b = CallbackId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("callback-"));
    }

    #[test]
    fn test_notify_all() {
        let registry = ScopeRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            registry.register(move |path| {
                seen.lock().unwrap().push(format!("{tag}:{path}"));
                Ok(())
            });
        }

        registry.notify_release("A").unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first:A", "second:A"]);
    }

    #[test]
    fn test_failures_are_isolated() {
        let registry = ScopeRegistry::new();
        let called = Arc::new(Mutex::new(0));

        registry.register(|_| Err(DiError::creation_failed("cb", "refused")));
        registry.register(|_| panic!("callback exploded"));
        let counter = Arc::clone(&called);
        registry.register(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        let err = registry.notify_release("A.B").unwrap_err();
        match err {
            DiError::CallbackFailed { path, failures } => {
                assert_eq!(path, "A.B");
                assert_eq!(failures.len(), 2);
                assert!(failures[1].contains("callback exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*called.lock().unwrap(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = ScopeRegistry::new();
        let id = registry.register(|_| Ok(()));
        assert_eq!(registry.len(), 1);
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }
}
