//! The injection context
//!
//! A [`Context`] owns one of each registry and is the entry point for
//! loading modules, resolving definitions and releasing scopes.

use crate::factory::{InstanceFactory, SandboxInstanceFactory, SingletonInstanceFactory};
use crate::module::ModuleFlattener;
use crate::{
    BeanRegistry, CallbackId, Definition, DiError, Injectable, Instance, Kind, ModuleDefinition,
    Parameters, Path, PathRegistry, PropertiesConfig, PropertyRegistry, Result, ScopeRegistry,
    TypeKey,
};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[cfg(feature = "logging")]
use tracing::{debug, info, trace};

// =============================================================================
// Resolution stack (cycle detection)
// =============================================================================

thread_local! {
    /// Definitions currently being resolved on this thread, tagged by context id
    static RESOLVING: RefCell<Vec<(u64, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a definition as in-flight on this thread until dropped.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(context_id: u64, name: &str) -> Result<Self> {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(id, n)| *id == context_id && n == name) {
                let mut chain: Vec<String> = stack
                    .iter()
                    .filter(|(id, _)| *id == context_id)
                    .map(|(_, n)| n.clone())
                    .skip_while(|n| n != name)
                    .collect();
                chain.push(name.to_owned());
                return Err(DiError::CircularDependency {
                    name: name.to_owned(),
                    chain,
                });
            }
            stack.push((context_id, name.to_owned()));
            Ok(ResolutionGuard)
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// =============================================================================
// Context
// =============================================================================

/// Registry aggregate: definitions, cached instances, paths, release
/// callbacks and properties.
///
/// Loads are serialized per context; resolution is lock-free apart from
/// the per-singleton initialization guard.
///
/// # Examples
///
/// ```rust
/// use modular_injector::{Context, ModuleDefinition};
/// use std::sync::Arc;
///
/// struct Database { url: String }
///
/// let ctx = Context::new();
/// ctx.load_modules(&[
///     ModuleDefinition::at("data").single(|_, _| Ok(Database { url: "mem://".into() })),
/// ])
/// .unwrap();
///
/// let a = ctx.get::<Database>().unwrap();
/// let b = ctx.get::<Database>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// ctx.release("data").unwrap();
/// assert!(ctx.get::<Database>().is_err());
/// ```
pub struct Context {
    id: u64,
    beans: BeanRegistry,
    paths: PathRegistry,
    instances: Box<dyn InstanceFactory>,
    scopes: ScopeRegistry,
    properties: PropertyRegistry,
    /// Serializes loads and declarations
    load_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Context {
    /// Create an empty context with the durable singleton cache.
    pub fn new() -> Self {
        Self::with_factory(Box::new(SingletonInstanceFactory::new()))
    }

    /// Create an empty context whose resolutions never cache (dry runs).
    pub fn sandbox() -> Self {
        Self::with_factory(Box::new(SandboxInstanceFactory))
    }

    fn with_factory(instances: Box<dyn InstanceFactory>) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "logging")]
        debug!(target: "modular_injector", context = id, "Creating context");

        Self {
            id,
            beans: BeanRegistry::new(),
            paths: PathRegistry::new(),
            instances,
            scopes: ScopeRegistry::new(),
            properties: PropertyRegistry::new(),
            load_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Register every module tree, then build the eager singletons.
    ///
    /// The whole operation holds this context's load lock. Construction
    /// closures run during the eager phase must not load modules into the
    /// same context.
    ///
    /// An override evicts the replaced singleton. A resolution that picked
    /// up the replaced definition before the override still returns a value
    /// built from it, but that value is never cached under the name.
    pub fn load_modules(&self, modules: &[ModuleDefinition]) -> Result<&Self> {
        let _guard = self.lock_loads()?;
        self.register_modules(modules)?;
        self.create_eager_instances()?;
        Ok(self)
    }

    /// Flatten modules into the registries without eager instantiation
    pub(crate) fn register_modules(&self, modules: &[ModuleDefinition]) -> Result<usize> {
        let start = Instant::now();
        let flattener = self.flattener();

        let mut declared = 0;
        for module in modules {
            declared += flattener.flatten(module, None)?;
        }

        #[cfg(feature = "logging")]
        info!(
            target: "modular_injector",
            context = self.id,
            modules = modules.len(),
            declared,
            total = self.beans.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Modules loaded"
        );
        #[cfg(not(feature = "logging"))]
        let _ = start;

        Ok(declared)
    }

    /// Build every eager singleton now. Returns how many were resolved.
    pub fn create_eager_instances(&self) -> Result<usize> {
        self.check_open()?;
        let eager = self.beans.eager_definitions();
        let mut created = 0;

        for definition in eager.iter().filter(|d| d.kind() == Kind::Single) {
            #[cfg(feature = "logging")]
            debug!(
                target: "modular_injector",
                definition = definition.name(),
                "Creating eager instance"
            );
            self.resolve(definition, &Parameters::new())?;
            created += 1;
        }

        Ok(created)
    }

    /// Merge properties from the configured origins (file, extras, environment).
    pub fn load_properties(&self, config: &PropertiesConfig) -> Result<&Self> {
        let _guard = self.lock_loads()?;
        config.apply(&self.properties)?;
        Ok(self)
    }

    /// Declare one definition at the root path after start.
    ///
    /// Follows the same override and cache-eviction rules as module loading,
    /// including the in-flight resolution rule described there. An eager
    /// singleton is built immediately.
    pub fn declare(&self, definition: Definition) -> Result<()> {
        let _guard = self.lock_loads()?;
        let definition = definition.resolved(&Path::root(), false, false);
        let eager = definition.is_eager() && definition.kind() == Kind::Single;
        self.flattener().declare(definition.clone())?;
        if eager {
            self.resolve(&definition, &Parameters::new())?;
        }
        Ok(())
    }

    fn flattener(&self) -> ModuleFlattener<'_> {
        ModuleFlattener {
            paths: &self.paths,
            beans: &self.beans,
            instances: self.instances.as_ref(),
        }
    }

    fn lock_loads(&self) -> Result<MutexGuard<'_, ()>> {
        self.check_open()?;
        // A panicking closure poisons the lock without corrupting the registries
        Ok(self.load_lock.lock().unwrap_or_else(PoisonError::into_inner))
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve the only (or default-named) definition of `T`.
    #[inline]
    pub fn get<T: Injectable>(&self) -> Result<Arc<T>> {
        self.get_with::<T>(None, &Parameters::new())
    }

    /// Resolve the definition named `name`.
    #[inline]
    pub fn get_named<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        self.get_with::<T>(Some(name), &Parameters::new())
    }

    /// Resolve with an optional name and construction parameters.
    ///
    /// Parameters only matter when a value is actually built: a cached
    /// singleton ignores them.
    pub fn get_with<T: Injectable>(&self, name: Option<&str>, params: &Parameters) -> Result<Arc<T>> {
        let type_key = TypeKey::of::<T>();
        let instance = self.get_any(type_key, name, params)?;
        instance.downcast::<T>().map_err(|_| DiError::TypeMismatch {
            name: name.unwrap_or_default().to_owned(),
            expected: type_key.name(),
            found: "a different type",
        })
    }

    /// Resolve, returning `None` on any failure
    #[inline]
    pub fn try_get<T: Injectable>(&self) -> Option<Arc<T>> {
        self.get::<T>().ok()
    }

    /// Untyped resolution by type identity.
    pub fn get_any(&self, type_key: TypeKey, name: Option<&str>, params: &Parameters) -> Result<Instance> {
        self.check_open()?;

        let definition = self.beans.find(type_key, name).inspect_err(|_err| {
            #[cfg(feature = "logging")]
            debug!(
                target: "modular_injector",
                service = type_key.name(),
                requested = ?name,
                error = %_err,
                "Definition lookup failed"
            );
        })?;

        self.resolve(&definition, params)
    }

    /// Materialize `definition` through this context's instance factory
    pub(crate) fn resolve(&self, definition: &Definition, params: &Parameters) -> Result<Instance> {
        let _in_flight = ResolutionGuard::enter(self.id, definition.name())?;

        #[cfg(feature = "logging")]
        trace!(
            target: "modular_injector",
            definition = definition.name(),
            kind = ?definition.kind(),
            "Resolving definition"
        );

        self.instances.resolve(self, definition, params)
    }

    // =========================================================================
    // Release & lifecycle
    // =========================================================================

    /// Release a path given in string form (`""` is the root, `"A.B"` nests).
    ///
    /// Returns the number of definitions removed. Callbacks are told only
    /// if something was removed. Releasing while another thread resolves a
    /// definition under the same path has no ordering guarantee.
    pub fn release(&self, path: &str) -> Result<usize> {
        self.release_path(&Path::parse(path))
    }

    /// Release every definition and cached instance at or under `path`.
    pub fn release_path(&self, path: &Path) -> Result<usize> {
        self.check_open()?;
        self.release_inner(path)
    }

    fn release_inner(&self, path: &Path) -> Result<usize> {
        let mut removed = 0;
        let mut evicted = 0;
        for name in self.paths.release(path) {
            if self.beans.remove(&name).is_some() {
                removed += 1;
            }
            if self.instances.delete(&name) {
                evicted += 1;
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "modular_injector",
            context = self.id,
            path = %path,
            definitions = removed,
            instances = evicted,
            "Released path"
        );
        #[cfg(not(feature = "logging"))]
        let _ = evicted;

        if removed > 0 {
            self.scopes.notify_release(&path.to_string())?;
        }
        Ok(removed)
    }

    /// Release everything and make the context unusable.
    ///
    /// Release callbacks run once for the root path; later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let result = self.release_inner(&Path::root());
        self.beans.clear();
        self.instances.clear();
        self.paths.clear();
        self.properties.clear();
        self.scopes.clear();

        #[cfg(feature = "logging")]
        debug!(target: "modular_injector", context = self.id, "Context closed");

        result.map(|_| ())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[inline]
    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(DiError::ClosedContext)
        } else {
            Ok(())
        }
    }

    /// Be told (with the path string) whenever a path is released
    pub fn register_release_callback<F>(&self, callback: F) -> Result<CallbackId>
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.check_open()?;
        Ok(self.scopes.register(callback))
    }

    pub fn unregister_release_callback(&self, id: CallbackId) -> Result<bool> {
        self.check_open()?;
        Ok(self.scopes.unregister(id))
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn get_property<T: Injectable>(&self, key: &str) -> Result<Arc<T>> {
        self.check_open()?;
        self.properties.get(key)
    }

    /// Missing keys give `default`; a closed context still fails
    pub fn get_property_or<T: Injectable + Clone>(&self, key: &str, default: T) -> Result<T> {
        self.check_open()?;
        Ok(self.properties.get_or(key, default))
    }

    pub fn set_property<T: Injectable>(&self, key: impl Into<String>, value: T) -> Result<()> {
        self.check_open()?;
        self.properties.set(key, value);
        Ok(())
    }

    #[inline]
    pub fn properties(&self) -> &PropertyRegistry {
        &self.properties
    }

    // =========================================================================
    // Introspection
    // =========================================================================
    //
    // Observational only: these never fail and report nothing after close.

    /// All declared definitions, sorted by name
    pub fn definitions(&self) -> Vec<Definition> {
        self.beans.definitions()
    }

    /// Names declared at or under `path`
    pub fn definitions_under(&self, path: &str) -> Vec<String> {
        self.paths.names_under(&Path::parse(path)).into_iter().collect()
    }

    /// Known paths
    pub fn paths(&self) -> Vec<Path> {
        self.paths.paths()
    }

    /// Number of cached singleton instances
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("definitions", &self.beans.len())
            .field("instances", &self.instances.len())
            .field("paths", &self.paths.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
