//! Bean registry: definition name -> definition
//!
//! Uses DashMap for lock-free concurrent lookups during resolution.

use crate::{Definition, DiError, Result, TypeKey};
use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[cfg(feature = "logging")]
use tracing::debug;

/// Thread-safe storage for definitions, keyed by definition name.
///
/// Invariant: every stored definition's name equals its key.
pub struct BeanRegistry {
    definitions: DashMap<String, Definition, RandomState>,
}

impl BeanRegistry {
    /// Create a new empty registry.
    ///
    /// Uses 8 shards: module graphs rarely exceed a few hundred
    /// definitions and registry creation happens per context.
    #[inline]
    pub fn new() -> Self {
        Self {
            definitions: DashMap::with_capacity_and_hasher_and_shard_amount(
                0,
                RandomState::new(),
                8,
            ),
        }
    }

    /// Fail with `NamingConflict` if `definition` may not take its name.
    ///
    /// Replacement is allowed when either the incoming or the existing
    /// declaration allows override.
    pub fn check_declarable(&self, definition: &Definition) -> Result<()> {
        match self.definitions.get(definition.name()) {
            Some(existing) if !definition.allows_override() && !existing.allows_override() => {
                Err(DiError::NamingConflict {
                    name: definition.name().to_owned(),
                    path: existing.path().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Insert `definition` under its name, returning the one it replaced.
    pub fn declare(&self, definition: Definition) -> Result<Option<Definition>> {
        match self.definitions.entry(definition.name().to_owned()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                if !definition.allows_override() && !existing.allows_override() {
                    return Err(DiError::NamingConflict {
                        name: definition.name().to_owned(),
                        path: existing.path().to_string(),
                    });
                }

                #[cfg(feature = "logging")]
                debug!(
                    target: "modular_injector",
                    definition = definition.name(),
                    old_path = %existing.path(),
                    new_path = %definition.path(),
                    "Overriding definition"
                );

                Ok(Some(entry.insert(definition)))
            }
            Entry::Vacant(entry) => {
                entry.insert(definition);
                Ok(None)
            }
        }
    }

    /// Find the definition for `type_key`.
    ///
    /// With a name, the name is the exact key and the type must match.
    /// Without one, the single definition of that type wins; if several
    /// exist, only one of them carrying its default name may be picked.
    pub fn find(&self, type_key: TypeKey, name: Option<&str>) -> Result<Definition> {
        match name {
            Some(name) => {
                let definition = self
                    .definitions
                    .get(name)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| DiError::NotFound {
                        type_name: type_key.name(),
                        name: Some(name.to_owned()),
                    })?;
                if definition.type_key() != type_key {
                    return Err(DiError::TypeMismatch {
                        name: name.to_owned(),
                        expected: type_key.name(),
                        found: definition.type_key().name(),
                    });
                }
                Ok(definition)
            }
            None => self.find_by_type(type_key),
        }
    }

    fn find_by_type(&self, type_key: TypeKey) -> Result<Definition> {
        let mut candidates: Vec<Definition> = self
            .definitions
            .iter()
            .filter(|entry| entry.type_key() == type_key)
            .map(|entry| entry.value().clone())
            .collect();

        if candidates.len() > 1 {
            let defaults: Vec<&Definition> =
                candidates.iter().filter(|d| d.has_default_name()).collect();
            if let [only] = defaults.as_slice() {
                return Ok((*only).clone());
            }
            let mut names: Vec<String> = candidates.iter().map(|d| d.name().to_owned()).collect();
            names.sort();
            return Err(DiError::AmbiguousDefinition {
                type_name: type_key.name(),
                candidates: names,
            });
        }

        candidates.pop().ok_or(DiError::NotFound {
            type_name: type_key.name(),
            name: None,
        })
    }

    /// Definition by name, regardless of type
    pub fn get(&self, name: &str) -> Option<Definition> {
        self.definitions.get(name).map(|entry| entry.value().clone())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Remove one definition by name
    pub fn remove(&self, name: &str) -> Option<Definition> {
        self.definitions.remove(name).map(|(_, definition)| definition)
    }

    /// Snapshot of all definitions, sorted by name
    pub fn definitions(&self) -> Vec<Definition> {
        let mut all: Vec<Definition> = self.definitions.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Snapshot of the eager definitions, sorted by name
    pub fn eager_definitions(&self) -> Vec<Definition> {
        let mut eager: Vec<Definition> = self
            .definitions
            .iter()
            .filter(|e| e.is_eager())
            .map(|e| e.value().clone())
            .collect();
        eager.sort_by(|a, b| a.name().cmp(b.name()));
        eager
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    #[inline]
    pub fn clear(&self) {
        self.definitions.clear();
    }
}

impl Default for BeanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BeanRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanRegistry")
            .field("count", &self.len())
            .finish()
    }
}
