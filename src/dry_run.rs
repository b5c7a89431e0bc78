//! Dry-run validation of module graphs
//!
//! Loads the modules into a sandbox [`Context`] whose instance factory
//! never caches, then builds every definition once. Failures are collected
//! so one pass reports every broken definition.
//!
//! # Examples
//!
//! ```rust
//! use modular_injector::{DryRun, ModuleDefinition};
//! use std::sync::Arc;
//!
//! struct Repository;
//! struct Service { repo: Arc<Repository> }
//!
//! // Repository is never provided
//! let modules = [ModuleDefinition::new().single(|ctx, _| Ok(Service { repo: ctx.get()? }))];
//!
//! let report = DryRun::new(&modules).run().unwrap();
//! assert_eq!(report.failures().len(), 1);
//! assert!(report.into_result().is_err());
//! ```

use crate::{Context, DiError, ModuleDefinition, Parameters, Path, PropertiesConfig, Result};
use std::collections::HashMap;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// One definition that failed to build.
#[derive(Debug, Clone)]
pub struct DryRunFailure {
    pub name: String,
    pub type_name: &'static str,
    pub path: Path,
    pub error: DiError,
}

impl std::fmt::Display for DryRunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({}): {}", self.name, self.type_name, self.error)
    }
}

/// Outcome of a dry run.
#[derive(Debug, Clone, Default)]
pub struct DryRunReport {
    checked: Vec<String>,
    failures: Vec<DryRunFailure>,
}

impl DryRunReport {
    /// Names of definitions that built successfully
    pub fn checked(&self) -> &[String] {
        &self.checked
    }

    pub fn failures(&self) -> &[DryRunFailure] {
        &self.failures
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    /// `ValidationFailed` listing every failure, or `Ok`
    pub fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(DiError::ValidationFailed {
                failures: self.failures.iter().map(ToString::to_string).collect(),
            })
        }
    }
}

/// Dry-run builder.
pub struct DryRun<'a> {
    modules: &'a [ModuleDefinition],
    parameters: HashMap<String, Parameters>,
    properties: Option<PropertiesConfig>,
}

impl<'a> DryRun<'a> {
    pub fn new(modules: &'a [ModuleDefinition]) -> Self {
        Self {
            modules,
            parameters: HashMap::new(),
            properties: None,
        }
    }

    /// Parameters to build the definition named `name` with
    pub fn with_parameters(mut self, name: impl Into<String>, params: Parameters) -> Self {
        self.parameters.insert(name.into(), params);
        self
    }

    /// Properties to load into the sandbox first
    pub fn with_properties(mut self, config: PropertiesConfig) -> Self {
        self.properties = Some(config);
        self
    }

    /// Build every definition in a sandbox.
    ///
    /// Load-time errors (e.g. `NamingConflict`) are returned as `Err`;
    /// construction errors are collected in the report.
    pub fn run(&self) -> Result<DryRunReport> {
        let sandbox = Context::sandbox();
        if let Some(config) = &self.properties {
            sandbox.load_properties(config)?;
        }
        sandbox.register_modules(self.modules)?;

        let empty = Parameters::new();
        let mut report = DryRunReport::default();

        for definition in sandbox.definitions() {
            let params = self.parameters.get(definition.name()).unwrap_or(&empty);
            match sandbox.resolve(&definition, params) {
                Ok(_) => report.checked.push(definition.name().to_owned()),
                Err(error) => {
                    #[cfg(feature = "logging")]
                    warn!(
                        target: "modular_injector",
                        definition = definition.name(),
                        error = %error,
                        "Dry run: definition failed"
                    );
                    report.failures.push(DryRunFailure {
                        name: definition.name().to_owned(),
                        type_name: definition.type_key().name(),
                        path: definition.path().clone(),
                        error,
                    });
                }
            }
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "modular_injector",
            checked = report.checked.len(),
            failed = report.failures.len(),
            "Dry run finished"
        );

        sandbox.close()?;
        Ok(report)
    }
}

/// Dry-run `modules` with no parameters or properties
pub fn check_modules(modules: &[ModuleDefinition]) -> Result<DryRunReport> {
    DryRun::new(modules).run()
}
