//! # Modular Injector - Module-Based Dependency Injection for Rust
//!
//! A runtime that loads declarative module trees into an injection
//! [`Context`], resolves typed definitions on demand and tears down whole
//! scopes by path.
//!
//! ## Features
//!
//! - ⚡ **Lock-free registries** - `DashMap` with `ahash` behind every registry
//! - 🧩 **Module trees** - nested modules map to hierarchical paths (`"A.B"`)
//! - 🏭 **Singletons and factories** - cached once per context, or built on every resolve
//! - 🚀 **Eager instantiation** - `create_on_start` modules are built while loading
//! - ♻️ **Scoped release** - drop every definition under a path and notify listeners
//! - 🔍 **Dry runs** - build every definition in a sandbox and report all failures
//! - 📊 **Observable** - optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use modular_injector::{Context, ModuleDefinition};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let app = ModuleDefinition::new()
//!     .single(|_, _| Ok(Database { url: "postgres://localhost".into() }))
//!     .factory(|ctx, _| Ok(UserService { db: ctx.get()? }));
//!
//! let ctx = Context::new();
//! ctx.load_modules(&[app]).unwrap();
//!
//! // Resolve - returns Arc<T>; singletons are shared
//! let users = ctx.get::<UserService>().unwrap();
//! assert_eq!(users.db.url, "postgres://localhost");
//! ```
//!
//! ## Names, Parameters and Paths
//!
//! ```rust
//! use modular_injector::{parameters, Context, Definition, ModuleDefinition};
//!
//! struct Endpoint {
//!     port: u16,
//! }
//!
//! let ctx = Context::new();
//! ctx.load_modules(&[ModuleDefinition::at("http").definition(
//!     Definition::factory(|_, params| Ok(Endpoint { port: *params.get(0)? })).named("endpoint"),
//! )])
//! .unwrap();
//!
//! let endpoint = ctx
//!     .get_with::<Endpoint>(Some("endpoint"), &parameters![8080u16])
//!     .unwrap();
//! assert_eq!(endpoint.port, 8080);
//!
//! // Everything declared under "http" goes away
//! assert_eq!(ctx.release("http").unwrap(), 1);
//! assert!(ctx.get_named::<Endpoint>("endpoint").is_err());
//! ```
//!
//! ## Validation
//!
//! ```rust
//! use modular_injector::{check_modules, ModuleDefinition};
//! use std::sync::Arc;
//!
//! struct Cache;
//! struct Api { cache: Arc<Cache> }
//!
//! let modules = [ModuleDefinition::new().single(|ctx, _| Ok(Api { cache: ctx.get()? }))];
//! let report = check_modules(&modules).unwrap();
//! assert_eq!(report.failures().len(), 1);
//! ```

mod bean;
mod context;
mod definition;
mod dry_run;
mod error;
mod factory;
#[cfg(feature = "logging")]
pub mod logging;
mod module;
mod parameters;
mod path;
mod property;
mod provider;
mod scope;
pub mod standalone;

pub use bean::*;
pub use context::*;
pub use definition::*;
pub use dry_run::*;
pub use error::*;
pub use factory::*;
pub use module::*;
pub use parameters::*;
pub use path::*;
pub use property::*;
pub use provider::*;
pub use scope::*;

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CallbackId, Context, Definition, DiError, DryRun, Injectable, Kind, ModuleDefinition,
        Parameters, Path, PropertiesConfig, Result, TypeKey, check_modules,
    };
    pub use std::sync::Arc;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Database {
        url: String,
    }

    #[derive(Debug, PartialEq)]
    struct Value(&'static str);

    fn value_module(path: &str, value: &'static str) -> ModuleDefinition {
        ModuleDefinition::at(path).definition(Definition::single(move |_, _| Ok(Value(value))).named("n"))
    }

    #[test]
    fn test_override_rejected_without_flag() {
        let ctx = Context::new();
        ctx.load_modules(&[value_module("", "a")]).unwrap();

        let err = ctx.load_modules(&[value_module("", "b")]).unwrap_err();
        assert!(matches!(err, DiError::NamingConflict { ref name, .. } if name == "n"));
        assert_eq!(*ctx.get_named::<Value>("n").unwrap(), Value("a"));
    }

    #[test]
    fn test_override_allowed_by_either_side() {
        // Incoming module allows it
        let ctx = Context::new();
        ctx.load_modules(&[value_module("", "a")]).unwrap();
        ctx.load_modules(&[value_module("", "b").allow_override()]).unwrap();
        assert_eq!(*ctx.get_named::<Value>("n").unwrap(), Value("b"));

        // Existing definition allows it
        let ctx = Context::new();
        ctx.load_modules(&[value_module("", "a").allow_override()]).unwrap();
        ctx.load_modules(&[value_module("", "b")]).unwrap();
        assert_eq!(*ctx.get_named::<Value>("n").unwrap(), Value("b"));
    }

    #[test]
    fn test_eager_module_builds_during_load() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        let ctx = Context::new();
        ctx.load_modules(&[ModuleDefinition::new().create_on_start().single(|_, _| {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Ok(Database { url: "mem://".into() })
        })])
        .unwrap();

        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.instance_count(), 1);

        ctx.get::<Database>().unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_eager_factory_is_not_built() {
        static BUILT: AtomicU32 = AtomicU32::new(0);

        let ctx = Context::new();
        ctx.load_modules(&[ModuleDefinition::new().create_on_start().factory(|_, _| {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Ok(Value("fresh"))
        })])
        .unwrap();

        assert_eq!(BUILT.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_release_isolates_sibling_paths() {
        #[derive(Debug)]
        struct InA;
        struct InB;

        let ctx = Context::new();
        ctx.load_modules(&[
            ModuleDefinition::at("A").single(|_, _| Ok(InA)),
            ModuleDefinition::at("B").single(|_, _| Ok(InB)),
        ])
        .unwrap();
        let b_before = ctx.get::<InB>().unwrap();
        ctx.get::<InA>().unwrap();

        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&released);
        ctx.register_release_callback(move |path| {
            sink.lock().unwrap().push(path.to_owned());
            Ok(())
        })
        .unwrap();

        assert_eq!(ctx.release("A").unwrap(), 1);
        assert!(ctx.get::<InA>().unwrap_err().is_not_found());
        assert!(Arc::ptr_eq(&b_before, &ctx.get::<InB>().unwrap()));
        assert_eq!(*released.lock().unwrap(), vec!["A".to_string()]);

        // Nothing left under "A": no second notification
        assert_eq!(ctx.release("A").unwrap(), 0);
        assert_eq!(released.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_release_covers_nested_paths() {
        struct Outer;
        struct Inner;

        let ctx = Context::new();
        ctx.load_modules(&[ModuleDefinition::at("A")
            .single(|_, _| Ok(Outer))
            .module(ModuleDefinition::at("B").single(|_, _| Ok(Inner)))])
            .unwrap();

        assert_eq!(ctx.definitions_under("A").len(), 2);
        assert_eq!(ctx.release("A").unwrap(), 2);
        assert!(ctx.try_get::<Inner>().is_none());
        assert!(ctx.definitions().is_empty());
    }

    #[test]
    fn test_ambiguous_unnamed_lookup() {
        let ctx = Context::new();
        ctx.load_modules(&[ModuleDefinition::new()
            .definition(Definition::single(|_, _| Ok(Value("x"))).named("x"))
            .definition(Definition::single(|_, _| Ok(Value("y"))).named("y"))])
            .unwrap();

        match ctx.get::<Value>() {
            Err(DiError::AmbiguousDefinition { candidates, .. }) => {
                assert_eq!(candidates, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }

        // A default-named candidate breaks the tie
        ctx.declare(Definition::single(|_, _| Ok(Value("default")))).unwrap();
        assert_eq!(*ctx.get::<Value>().unwrap(), Value("default"));
    }

    #[test]
    fn test_close_notifies_root_once() {
        static CALLS: AtomicU32 = AtomicU32::new(0);

        let ctx = Context::new();
        ctx.load_modules(&[ModuleDefinition::new().single(|_, _| Ok(Value("v")))])
            .unwrap();
        ctx.register_release_callback(|path| {
            assert_eq!(path, "");
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        ctx.close().unwrap();
        ctx.close().unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let ctx = Context::new();
        ctx.declare(Definition::single(|_, _| Ok(Database { url: "mem://".into() })))
            .unwrap();
        let db: Arc<Database> = ctx.get().unwrap();
        assert_eq!(db.url, "mem://");
    }
}
