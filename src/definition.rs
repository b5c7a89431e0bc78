//! Definitions: how to build one named, typed value
//!
//! A [`Definition`] is an immutable recipe. Authors create templates with
//! [`Definition::single`] / [`Definition::factory`] inside a module; the
//! flattener fills in the path, the effective name and the inherited
//! eager/override flags when the module is loaded.

use crate::{Context, Injectable, Parameters, Path, Result, TypeKey};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Declaration order across every context; templates keep 0
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// A built value, type-erased
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased construction closure
pub(crate) type ConstructFn = Arc<dyn Fn(&Context, &Parameters) -> Result<Instance> + Send + Sync>;

/// How often a definition's closure runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Kind {
    /// Built once per context on first resolution, then shared
    #[default]
    Single,

    /// Built on every resolution
    Factory,
}

/// Immutable recipe for one named, typed value.
#[derive(Clone)]
pub struct Definition {
    pub(crate) type_key: TypeKey,
    pub(crate) name: String,
    pub(crate) kind: Kind,
    pub(crate) is_eager: bool,
    pub(crate) allow_override: bool,
    pub(crate) path: Path,
    pub(crate) serial: u64,
    construct: ConstructFn,
}

impl Definition {
    /// Shared singleton built by `construct` on first resolution.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modular_injector::{Definition, Kind};
    ///
    /// struct Database { url: String }
    ///
    /// let def = Definition::single(|_ctx, _params| Ok(Database { url: "mem://".into() }));
    /// assert_eq!(def.kind(), Kind::Single);
    /// assert!(def.name().is_empty());
    /// ```
    pub fn single<T, F>(construct: F) -> Self
    where
        T: Injectable,
        F: Fn(&Context, &Parameters) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(Kind::Single, construct)
    }

    /// Fresh value on every resolution
    pub fn factory<T, F>(construct: F) -> Self
    where
        T: Injectable,
        F: Fn(&Context, &Parameters) -> Result<T> + Send + Sync + 'static,
    {
        Self::new(Kind::Factory, construct)
    }

    fn new<T, F>(kind: Kind, construct: F) -> Self
    where
        T: Injectable,
        F: Fn(&Context, &Parameters) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            type_key: TypeKey::of::<T>(),
            name: String::new(),
            kind,
            is_eager: false,
            allow_override: false,
            path: Path::root(),
            serial: 0,
            construct: Arc::new(move |ctx, params| {
                construct(ctx, params).map(|value| Arc::new(value) as Instance)
            }),
        }
    }

    /// Explicit name; otherwise `"<path>.<type name>"` is used
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Build at load time instead of first use
    pub fn eager(mut self) -> Self {
        self.is_eager = true;
        self
    }

    /// Allow this declaration to replace (or be replaced by) one with the same name
    pub fn allow_override(mut self) -> Self {
        self.allow_override = true;
        self
    }

    #[inline]
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    /// Effective name (empty on an unresolved template without explicit name)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    pub fn is_eager(&self) -> bool {
        self.is_eager
    }

    #[inline]
    pub fn allows_override(&self) -> bool {
        self.allow_override
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name given to an unnamed definition of `type_key` declared at `path`
    pub fn default_name(path: &Path, type_key: TypeKey) -> String {
        if path.is_root() {
            type_key.name().to_owned()
        } else {
            format!("{path}.{}", type_key.name())
        }
    }

    /// True when this definition carries the type-derived name for its path
    pub fn has_default_name(&self) -> bool {
        self.name == Self::default_name(&self.path, self.type_key)
    }

    /// Finalize a template declared in a module at `path`
    pub(crate) fn resolved(&self, path: &Path, eager: bool, allow_override: bool) -> Self {
        let name = if self.name.is_empty() {
            Self::default_name(path, self.type_key)
        } else {
            self.name.clone()
        };
        Self {
            name,
            is_eager: eager || self.is_eager,
            allow_override: allow_override || self.allow_override,
            path: path.clone(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            ..self.clone()
        }
    }

    /// Increases with every finalized declaration; later declarations win
    #[inline]
    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// Run the construction closure
    #[inline]
    pub(crate) fn construct(&self, ctx: &Context, params: &Parameters) -> Result<Instance> {
        (self.construct)(ctx, params)
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("type", &self.type_key)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("eager", &self.is_eager)
            .field("override", &self.allow_override)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Service;

    #[test]
    fn test_template_defaults() {
        let def = Definition::factory(|_, _| Ok(Service));
        assert_eq!(def.kind(), Kind::Factory);
        assert_eq!(def.type_key(), TypeKey::of::<Service>());
        assert!(!def.is_eager());
        assert!(!def.allows_override());
        assert!(def.path().is_root());
    }

    #[test]
    fn test_resolved_default_name() {
        let def = Definition::single(|_, _| Ok(Service));
        let key = TypeKey::of::<Service>();

        let at_root = def.resolved(&Path::root(), false, false);
        assert_eq!(at_root.name(), key.name());
        assert!(at_root.has_default_name());

        let nested = def.resolved(&Path::parse("A.B"), false, false);
        assert_eq!(nested.name(), format!("A.B.{}", key.name()));
        assert_eq!(nested.path(), &Path::parse("A.B"));
    }

    #[test]
    fn test_resolved_flags_only_raise() {
        let def = Definition::single(|_, _| Ok(Service)).eager().named("svc");

        let resolved = def.resolved(&Path::root(), false, true);
        assert!(resolved.is_eager());
        assert!(resolved.allows_override());
        assert_eq!(resolved.name(), "svc");
        assert!(!resolved.has_default_name());

        let plain = Definition::single(|_, _| Ok(Service)).resolved(&Path::root(), true, false);
        assert!(plain.is_eager());
        assert!(!plain.allows_override());
    }
}
