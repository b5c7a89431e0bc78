//! Instance factories: turning definitions into values
//!
//! The [`InstanceFactory`] trait is the seam between the registries and
//! the construction closures. Two variants exist:
//!
//! - [`SingletonInstanceFactory`] - the durable one. Singletons are cached
//!   by definition name on first resolution; factories run every time.
//! - [`SandboxInstanceFactory`] - used by dry runs. Always constructs and
//!   never caches, so validation cannot perturb a production cache.

use crate::{Context, Definition, Instance, Kind, Parameters, Result};
use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Materializes definitions into instances.
pub trait InstanceFactory: Send + Sync {
    /// Build or fetch the value for `definition`
    fn resolve(&self, ctx: &Context, definition: &Definition, params: &Parameters)
        -> Result<Instance>;

    /// Evict the cached value for a definition name. Returns true if one was cached.
    fn delete(&self, name: &str) -> bool;

    /// Number of cached values
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict everything
    fn clear(&self);
}

/// A singleton slot. The cell is filled at most once; concurrent first
/// resolutions block on it so only one runs the closure.
///
/// `serial` is the declaration the slot belongs to. A resolution holding an
/// older declaration than the slot's never writes into it.
struct InstanceSlot {
    serial: u64,
    cell: OnceCell<Instance>,
}

impl InstanceSlot {
    fn new(serial: u64) -> Arc<Self> {
        Arc::new(Self {
            serial,
            cell: OnceCell::new(),
        })
    }
}

/// Durable factory: lazily populated singleton cache.
pub struct SingletonInstanceFactory {
    slots: DashMap<String, Arc<InstanceSlot>, RandomState>,
}

impl SingletonInstanceFactory {
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
        }
    }

    /// True if a value is cached for `name`
    pub fn is_cached(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .is_some_and(|slot| slot.cell.get().is_some())
    }

    fn resolve_single(
        &self,
        ctx: &Context,
        definition: &Definition,
        params: &Parameters,
    ) -> Result<Instance> {
        let name = definition.name();
        let serial = definition.serial();

        // Clone the slot out so the shard lock is not held while constructing
        let slot = {
            let mut entry = self
                .slots
                .entry(name.to_owned())
                .or_insert_with(|| InstanceSlot::new(serial));
            if entry.serial < serial {
                *entry = InstanceSlot::new(serial);
            }
            Arc::clone(entry.value())
        };

        if slot.serial > serial {
            // Replaced while this resolution was in flight
            #[cfg(feature = "logging")]
            debug!(
                target: "modular_injector",
                definition = name,
                "Definition was redeclared, building without caching"
            );
            return definition.construct(ctx, params);
        }

        if let Some(instance) = slot.cell.get() {
            #[cfg(feature = "logging")]
            trace!(
                target: "modular_injector",
                definition = name,
                "Singleton already created, returning cached instance"
            );
            return Ok(Arc::clone(instance));
        }

        let result = slot.cell.get_or_try_init(|| {
            #[cfg(feature = "logging")]
            debug!(
                target: "modular_injector",
                definition = name,
                path = %definition.path(),
                "Creating singleton on first resolution"
            );
            definition.construct(ctx, params)
        });

        match result {
            Ok(instance) => Ok(Arc::clone(instance)),
            Err(err) => {
                // Drop the empty slot so a later attempt starts clean
                self.slots
                    .remove_if(name, |_, s| Arc::ptr_eq(s, &slot) && s.cell.get().is_none());
                Err(err)
            }
        }
    }
}

impl InstanceFactory for SingletonInstanceFactory {
    fn resolve(
        &self,
        ctx: &Context,
        definition: &Definition,
        params: &Parameters,
    ) -> Result<Instance> {
        match definition.kind() {
            Kind::Single => self.resolve_single(ctx, definition, params),
            Kind::Factory => {
                #[cfg(feature = "logging")]
                trace!(
                    target: "modular_injector",
                    definition = definition.name(),
                    "Creating new factory instance"
                );
                definition.construct(ctx, params)
            }
        }
    }

    fn delete(&self, name: &str) -> bool {
        self.slots
            .remove(name)
            .is_some_and(|(_, slot)| slot.cell.get().is_some())
    }

    fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.cell.get().is_some())
            .count()
    }

    fn clear(&self) {
        self.slots.clear();
    }
}

impl Default for SingletonInstanceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingletonInstanceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonInstanceFactory")
            .field("cached", &self.len())
            .finish()
    }
}

/// Dry-run factory: constructs on every resolution, caches nothing.
#[derive(Debug, Default)]
pub struct SandboxInstanceFactory;

impl InstanceFactory for SandboxInstanceFactory {
    fn resolve(
        &self,
        ctx: &Context,
        definition: &Definition,
        params: &Parameters,
    ) -> Result<Instance> {
        #[cfg(feature = "logging")]
        trace!(
            target: "modular_injector",
            definition = definition.name(),
            "Sandbox construction"
        );
        definition.construct(ctx, params)
    }

    fn delete(&self, _name: &str) -> bool {
        false
    }

    fn len(&self) -> usize {
        0
    }

    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiError, Path};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TestService {
        id: u32,
    }

    fn counting(kind_single: bool, counter: &'static AtomicU32) -> Definition {
        let construct = move |_: &Context, _: &Parameters| {
            Ok(TestService {
                id: counter.fetch_add(1, Ordering::SeqCst),
            })
        };
        let def = if kind_single {
            Definition::single(construct)
        } else {
            Definition::factory(construct)
        };
        def.named("svc").resolved(&Path::parse("A"), false, false)
    }

    #[test]
    fn test_single_is_cached() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let ctx = Context::new();
        let factory = SingletonInstanceFactory::new();
        let def = counting(true, &COUNTER);

        let a = factory.resolve(&ctx, &def, &Parameters::new()).unwrap();
        let b = factory.resolve(&ctx, &def, &Parameters::new()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert!(factory.is_cached("svc"));
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn test_factory_is_fresh() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let ctx = Context::new();
        let factory = SingletonInstanceFactory::new();
        let def = counting(false, &COUNTER);

        let a = factory.resolve(&ctx, &def, &Parameters::new()).unwrap();
        let b = factory.resolve(&ctx, &def, &Parameters::new()).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.downcast::<TestService>().unwrap().id, 0);
        assert_eq!(b.downcast::<TestService>().unwrap().id, 1);
        assert_eq!(factory.len(), 0);
    }

    #[test]
    fn test_delete_and_clear() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let ctx = Context::new();
        let factory = SingletonInstanceFactory::new();
        let def = counting(true, &COUNTER);

        factory.resolve(&ctx, &def, &Parameters::new()).unwrap();
        assert!(factory.delete("svc"));
        assert!(!factory.delete("svc"));

        factory.resolve(&ctx, &def, &Parameters::new()).unwrap();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
        factory.clear();
        assert!(factory.is_empty());
    }

    #[test]
    fn test_replaced_definition_never_caches_over_newer_one() {
        let ctx = Context::new();
        let factory = SingletonInstanceFactory::new();
        let old = Definition::single(|_, _| Ok(TestService { id: 1 }))
            .named("svc")
            .resolved(&Path::root(), false, true);
        let new = Definition::single(|_, _| Ok(TestService { id: 2 }))
            .named("svc")
            .resolved(&Path::root(), false, true);
        assert!(new.serial() > old.serial());

        let stale = factory.resolve(&ctx, &old, &Parameters::new()).unwrap();
        assert_eq!(stale.downcast::<TestService>().unwrap().id, 1);

        // The newer declaration takes over the slot without an explicit delete
        let current = factory.resolve(&ctx, &new, &Parameters::new()).unwrap();
        assert_eq!(current.clone().downcast::<TestService>().unwrap().id, 2);

        // A resolution still holding the old declaration gets a fresh value
        let late = factory.resolve(&ctx, &old, &Parameters::new()).unwrap();
        assert_eq!(late.downcast::<TestService>().unwrap().id, 1);
        let again = factory.resolve(&ctx, &new, &Parameters::new()).unwrap();
        assert!(Arc::ptr_eq(&current, &again));
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn test_failed_construction_is_not_cached() {
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);
        let ctx = Context::new();
        let factory = SingletonInstanceFactory::new();
        let def = Definition::single(|_, _| {
            if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DiError::creation_failed("flaky", "first attempt"))
            } else {
                Ok(TestService { id: 7 })
            }
        })
        .named("flaky")
        .resolved(&Path::root(), false, false);

        assert!(factory.resolve(&ctx, &def, &Parameters::new()).is_err());
        assert!(!factory.is_cached("flaky"));

        let ok = factory.resolve(&ctx, &def, &Parameters::new()).unwrap();
        assert_eq!(ok.downcast::<TestService>().unwrap().id, 7);
    }

    #[test]
    fn test_concurrent_first_resolution_builds_once() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let ctx = Context::new();
        let factory = SingletonInstanceFactory::new();
        let def = Definition::single(|_, _| {
            COUNTER.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(10));
            Ok(TestService { id: 1 })
        })
        .named("slow")
        .resolved(&Path::root(), false, false);

        let instances: Vec<Instance> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| factory.resolve(&ctx, &def, &Parameters::new()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(COUNTER.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_sandbox_never_caches() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let ctx = Context::new();
        let factory = SandboxInstanceFactory;
        let def = counting(true, &COUNTER);

        let a = factory.resolve(&ctx, &def, &Parameters::new()).unwrap();
        let b = factory.resolve(&ctx, &def, &Parameters::new()).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
        assert!(factory.is_empty());
    }
}
