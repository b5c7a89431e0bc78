//! Error types for the injection runtime

use thiserror::Error;

/// Errors that can occur while loading modules, resolving definitions or
/// releasing scopes.
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// A process-wide context is already running
    #[error("A context is already started - stop it first or use load_modules")]
    AlreadyStarted,

    /// No definition matches the requested type/name
    #[error("No definition found for {type_name}{}", fmt_name(.name))]
    NotFound {
        type_name: &'static str,
        name: Option<String>,
    },

    /// Several definitions match an unnamed lookup and none is the default one
    #[error("Several definitions match {type_name}: {candidates:?} - resolve by name")]
    AmbiguousDefinition {
        type_name: &'static str,
        candidates: Vec<String>,
    },

    /// A definition with the same name exists and neither side allows override
    #[error("Definition '{name}' is already declared (path '{path}') and does not allow override")]
    NamingConflict { name: String, path: String },

    /// A named definition exists but produces another type
    #[error("Definition '{name}' provides {found}, not {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A construction closure failed
    #[error("Failed to create '{name}': {reason}")]
    CreationFailed { name: String, reason: String },

    /// A definition resolves itself, directly or through its dependencies
    #[error("Circular dependency detected while resolving '{name}': {}", .chain.join(" -> "))]
    CircularDependency { name: String, chain: Vec<String> },

    /// Positional parameter is absent or of another type
    #[error("Missing parameter #{index} of type {type_name}")]
    MissingParameter {
        index: usize,
        type_name: &'static str,
    },

    /// Property is absent or of another type
    #[error("Missing property '{key}'")]
    MissingProperty { key: String },

    /// A property source could not be read
    #[error("Failed to load properties from {source_name}: {reason}")]
    PropertySource { source_name: String, reason: String },

    /// The context was closed
    #[error("Context is closed")]
    ClosedContext,

    /// One or more release callbacks failed (the others still ran)
    #[error("{} release callback(s) failed for path '{path}': {}", .failures.len(), .failures.join("; "))]
    CallbackFailed { path: String, failures: Vec<String> },

    /// Dry run found broken definitions
    #[error("{} definition(s) failed validation: {}", .failures.len(), .failures.join("; "))]
    ValidationFailed { failures: Vec<String> },
}

fn fmt_name(name: &Option<String>) -> String {
    match name {
        Some(name) => format!(" named '{name}'"),
        None => String::new(),
    }
}

impl DiError {
    /// Create a NotFound error for a type
    #[inline]
    pub fn not_found<T: 'static>(name: Option<&str>) -> Self {
        Self::NotFound {
            type_name: std::any::type_name::<T>(),
            name: name.map(str::to_owned),
        }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a MissingParameter error
    #[inline]
    pub fn missing_parameter<T: 'static>(index: usize) -> Self {
        Self::MissingParameter {
            index,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Create a MissingProperty error
    #[inline]
    pub fn missing_property(key: impl Into<String>) -> Self {
        Self::MissingProperty { key: key.into() }
    }

    /// True for lookup failures (as opposed to construction or misuse errors)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
