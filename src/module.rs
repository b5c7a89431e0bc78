//! Module trees and their flattening into the registries
//!
//! A [`ModuleDefinition`] groups definitions under a path segment and may
//! nest sub-modules. Loading a module walks the tree, computes each node's
//! path from its ancestors, pushes the node's `create_on_start` and
//! `override` flags down onto its own definitions and declares them.
//!
//! # Examples
//!
//! ```rust
//! use modular_injector::{Context, ModuleDefinition};
//!
//! struct Config { name: String }
//! struct Greeter { config: std::sync::Arc<Config> }
//!
//! let module = ModuleDefinition::new()
//!     .single(|_, _| Ok(Config { name: "app".into() }))
//!     .module(
//!         ModuleDefinition::at("web")
//!             .factory(|ctx, _| Ok(Greeter { config: ctx.get::<Config>()? })),
//!     );
//!
//! let ctx = Context::new();
//! ctx.load_modules(&[module]).unwrap();
//!
//! let greeter = ctx.get::<Greeter>().unwrap();
//! assert_eq!(greeter.config.name, "app");
//! ```

use crate::factory::InstanceFactory;
use crate::{BeanRegistry, Context, Definition, Injectable, Parameters, Path, PathRegistry, Result};

#[cfg(feature = "logging")]
use tracing::trace;

/// A group of definition templates plus nested sub-modules.
#[derive(Clone, Default, Debug)]
pub struct ModuleDefinition {
    path: String,
    create_on_start: bool,
    allow_override: bool,
    definitions: Vec<Definition>,
    sub_modules: Vec<ModuleDefinition>,
}

impl ModuleDefinition {
    /// Module adding no path segment
    pub fn new() -> Self {
        Self::default()
    }

    /// Module declared under `path` (dotted segments nest)
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Build every definition of this module eagerly
    pub fn create_on_start(mut self) -> Self {
        self.create_on_start = true;
        self
    }

    /// Let every definition of this module override existing ones
    pub fn allow_override(mut self) -> Self {
        self.allow_override = true;
        self
    }

    /// Add a definition template
    pub fn definition(mut self, definition: Definition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Add an unnamed singleton
    pub fn single<T, F>(self, construct: F) -> Self
    where
        T: Injectable,
        F: Fn(&Context, &Parameters) -> Result<T> + Send + Sync + 'static,
    {
        self.definition(Definition::single(construct))
    }

    /// Add an unnamed factory
    pub fn factory<T, F>(self, construct: F) -> Self
    where
        T: Injectable,
        F: Fn(&Context, &Parameters) -> Result<T> + Send + Sync + 'static,
    {
        self.definition(Definition::factory(construct))
    }

    /// Nest a sub-module
    pub fn module(mut self, sub_module: ModuleDefinition) -> Self {
        self.sub_modules.push(sub_module);
        self
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn is_create_on_start(&self) -> bool {
        self.create_on_start
    }

    #[inline]
    pub fn allows_override(&self) -> bool {
        self.allow_override
    }

    #[inline]
    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    #[inline]
    pub fn sub_modules(&self) -> &[ModuleDefinition] {
        &self.sub_modules
    }
}

/// Walks module trees into the bean and path registries.
pub(crate) struct ModuleFlattener<'a> {
    pub(crate) paths: &'a PathRegistry,
    pub(crate) beans: &'a BeanRegistry,
    pub(crate) instances: &'a dyn InstanceFactory,
}

impl ModuleFlattener<'_> {
    /// Register `module` and its sub-modules under `parent`.
    /// Returns the number of definitions declared.
    pub(crate) fn flatten(&self, module: &ModuleDefinition, parent: Option<&Path>) -> Result<usize> {
        let path = self.paths.make_path(module.path(), parent);
        self.paths.save_path(&path);

        let mut declared = 0;
        for template in module.definitions() {
            let definition =
                template.resolved(&path, module.is_create_on_start(), module.allows_override());
            self.declare(definition)?;
            declared += 1;
        }

        for sub_module in module.sub_modules() {
            declared += self.flatten(sub_module, Some(&path))?;
        }

        Ok(declared)
    }

    /// Declare one finalized definition, evicting any instance cached under its name
    pub(crate) fn declare(&self, definition: Definition) -> Result<()> {
        self.beans.check_declarable(&definition)?;
        self.instances.delete(definition.name());

        #[cfg(feature = "logging")]
        trace!(
            target: "modular_injector",
            definition = definition.name(),
            path = %definition.path(),
            kind = ?definition.kind(),
            eager = definition.is_eager(),
            "Declaring definition"
        );

        let path = definition.path().clone();
        let name = definition.name().to_owned();
        if let Some(previous) = self.beans.declare(definition)? {
            self.paths.remove_definition(previous.path(), &name);
        }
        self.paths.add_definition(&path, &name);
        Ok(())
    }
}
