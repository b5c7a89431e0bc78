//! Injectable marker and type identity
//!
//! Definitions are keyed by an explicit [`TypeKey`] chosen at registration
//! time. Lookups only ever compare keys for equality; the registries never
//! introspect values.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Marker trait for types that can be provided by a definition.
///
/// Automatically implemented for every `Send + Sync + 'static` type.
pub trait Injectable: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Injectable for T {}

/// Identity of the type a definition produces.
///
/// Equality and hashing only consider the [`TypeId`]; the name is carried
/// for default definition names and diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for type `T`
    #[inline]
    pub fn of<T: Injectable>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name, e.g. `my_app::db::Database`
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path (generic arguments kept as-is)
    pub fn short_name(&self) -> &'static str {
        let head = self.name.split('<').next().unwrap_or(self.name);
        match head.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database;

    #[test]
    fn test_type_key_equality() {
        assert_eq!(TypeKey::of::<Database>(), TypeKey::of::<Database>());
        assert_ne!(TypeKey::of::<Database>(), TypeKey::of::<String>());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(TypeKey::of::<Database>().short_name(), "Database");
        assert_eq!(TypeKey::of::<u32>().short_name(), "u32");
        assert_eq!(TypeKey::of::<Vec<String>>().short_name(), "Vec<alloc::string::String>");
    }
}
