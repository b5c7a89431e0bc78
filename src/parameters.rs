//! Construction parameters
//!
//! Values passed positionally from `get_with` to a definition's
//! construction closure.

use crate::{DiError, Injectable, Result};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Ordered, type-erased parameter list.
///
/// # Examples
///
/// ```rust
/// use modular_injector::{Parameters, parameters};
///
/// let params = parameters!["main-db", 5432u16];
/// assert_eq!(*params.get::<&str>(0).unwrap(), "main-db");
/// assert_eq!(*params.get::<u16>(1).unwrap(), 5432);
/// assert!(params.get::<u16>(0).is_err());
/// ```
#[derive(Clone, Default)]
pub struct Parameters {
    values: Vec<Arc<dyn Any + Send + Sync>>,
}

impl Parameters {
    /// Empty parameter list
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value
    #[inline]
    pub fn with<T: Injectable>(mut self, value: T) -> Self {
        self.push(value);
        self
    }

    #[inline]
    pub fn push<T: Injectable>(&mut self, value: T) {
        self.values.push(Arc::new(value));
    }

    /// Value at `index`, downcast to `T`
    pub fn get<T: Injectable>(&self, index: usize) -> Result<Arc<T>> {
        self.values
            .get(index)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or_else(|| DiError::missing_parameter::<T>(index))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameters")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Build a [`Parameters`] list from values
#[macro_export]
macro_rules! parameters {
    () => {
        $crate::Parameters::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Parameters::new()$(.with($value))+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Port(u16);

    #[test]
    fn test_positional_access() {
        let params = Parameters::new().with(Port(80)).with(String::from("host"));

        assert_eq!(params.len(), 2);
        assert_eq!(*params.get::<Port>(0).unwrap(), Port(80));
        assert_eq!(params.get::<String>(1).unwrap().as_str(), "host");
    }

    #[test]
    fn test_missing_or_mistyped() {
        let params = parameters![Port(80)];

        assert!(matches!(
            params.get::<Port>(1),
            Err(DiError::MissingParameter { index: 1, .. })
        ));
        assert!(matches!(
            params.get::<String>(0),
            Err(DiError::MissingParameter { index: 0, .. })
        ));
    }

    #[test]
    fn test_empty_macro() {
        let params: Parameters = parameters![];
        assert!(params.is_empty());
    }
}
