//! Configuration properties
//!
//! The [`PropertyRegistry`] is a key -> value map (last writer wins) that
//! definitions can read through the context. It is filled from three
//! origins, applied in this order by `Context::load_properties`:
//!
//! 1. a properties file ([`PropertiesFile`])
//! 2. explicit extra properties
//! 3. the OS environment ([`EnvironmentSource`])

use crate::{DiError, Injectable, Result};
use ahash::RandomState;
use dashmap::DashMap;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// A stored property value, type-erased
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// Thread-safe property map.
pub struct PropertyRegistry {
    values: DashMap<String, PropertyValue, RandomState>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self {
            values: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Set (or replace) a property
    pub fn set<T: Injectable>(&self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Property value downcast to `T`; `MissingProperty` when absent or of another type
    pub fn get<T: Injectable>(&self, key: &str) -> Result<Arc<T>> {
        self.values
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or_else(|| DiError::missing_property(key))
    }

    /// Property value or `default`
    pub fn get_or<T: Injectable + Clone>(&self, key: &str, default: T) -> T {
        self.get::<T>(key).map_or(default, |value| (*value).clone())
    }

    /// String property, as loaded from files and the environment
    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get::<String>(key).map(|value| (*value).clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Merge type-erased values, replacing existing keys
    pub fn add_all(&self, values: &HashMap<String, PropertyValue>) -> usize {
        for (key, value) in values {
            self.values.insert(key.clone(), Arc::clone(value));
        }
        values.len()
    }

    /// Merge string values, replacing existing keys. Returns how many were imported.
    pub fn import<I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut count = 0;
        for (key, value) in values {
            self.values.insert(key, Arc::new(value));
            count += 1;
        }
        count
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&self) {
        self.values.clear();
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

/// An origin of string properties.
pub trait PropertySource {
    /// Name used in logs and errors
    fn name(&self) -> String;

    /// Read every key/value pair
    fn load(&self) -> Result<BTreeMap<String, String>>;
}

/// Java-style `.properties` file.
///
/// Supports `key=value`, `key: value` and `key value` lines, `#`/`!`
/// comments, and line continuations (a line ending in an odd number of
/// backslashes). Escapes `\t`, `\n`, `\r`, `\f` and `\uXXXX` (surrogate
/// pairs included) are decoded; any other escaped character stands for
/// itself, so `\=`, `\:` and `\ ` can appear in keys. Unescaped trailing
/// whitespace is dropped from values. A missing file yields no properties.
#[derive(Debug, Clone)]
pub struct PropertiesFile {
    path: PathBuf,
}

impl PropertiesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    /// Parse properties file content
    pub fn parse(content: &str) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        let mut pending = String::new();

        for raw in content.lines() {
            let line = raw.trim_start();
            if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
                continue;
            }

            let backslashes = line.len() - line.trim_end_matches('\\').len();
            if backslashes % 2 == 1 {
                pending.push_str(&line[..line.len() - 1]);
                continue;
            }
            pending.push_str(line);

            let logical = std::mem::take(&mut pending);
            if let Some((key, value)) = split_property(&logical) {
                properties.insert(key, value);
            }
        }

        if let Some((key, value)) = split_property(&pending) {
            properties.insert(key, value);
        }

        properties
    }
}

/// A decoded character and whether it was written as an escape
type Decoded = (char, bool);

fn split_property(line: &str) -> Option<(String, String)> {
    let chars = unescape(line);
    let chars = trim_start(&chars);
    if chars.is_empty() {
        return None;
    }

    let split = chars
        .iter()
        .position(|&(c, escaped)| !escaped && (c == '=' || c == ':' || c.is_whitespace()))
        .unwrap_or(chars.len());
    let key = chars[..split].iter().map(|&(c, _)| c).collect();

    let mut rest = trim_start(&chars[split..]);
    if let Some((&(c, false), tail)) = rest.split_first() {
        if c == '=' || c == ':' {
            rest = trim_start(tail);
        }
    }
    let end = rest
        .iter()
        .rposition(|decoded| !is_blank(decoded))
        .map_or(0, |last| last + 1);
    let value = rest[..end].iter().map(|&(c, _)| c).collect();

    Some((key, value))
}

fn is_blank(&(c, escaped): &Decoded) -> bool {
    !escaped && c.is_whitespace()
}

fn trim_start(chars: &[Decoded]) -> &[Decoded] {
    let first = chars
        .iter()
        .position(|decoded| !is_blank(decoded))
        .unwrap_or(chars.len());
    &chars[first..]
}

fn unescape(text: &str) -> Vec<Decoded> {
    let mut decoded = Vec::with_capacity(text.len());
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        rest = &rest[c.len_utf8()..];
        if c != '\\' {
            decoded.push((c, false));
            continue;
        }

        // A dangling backslash at the very end is dropped
        let Some(escaped) = rest.chars().next() else {
            break;
        };
        rest = &rest[escaped.len_utf8()..];
        let c = match escaped {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'f' => '\u{c}',
            'u' => match hex_unit(rest) {
                Some(unit) => {
                    rest = &rest[4..];
                    decode_unit(unit, &mut rest)
                }
                None => 'u',
            },
            other => other,
        };
        decoded.push((c, true));
    }

    decoded
}

/// Four hex digits at the start of `text`
fn hex_unit(text: &str) -> Option<u16> {
    let digits = text.get(..4)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// A `\u` code unit as a char; a high surrogate pulls in the `\uXXXX` low half after it
fn decode_unit(unit: u16, rest: &mut &str) -> char {
    if (0xD800..0xDC00).contains(&unit) {
        let low = rest
            .strip_prefix("\\u")
            .and_then(hex_unit)
            .filter(|low| (0xDC00..0xE000).contains(low));
        if let Some(low) = low {
            *rest = &rest[6..];
            return char::decode_utf16([unit, low])
                .next()
                .and_then(|pair| pair.ok())
                .unwrap_or(char::REPLACEMENT_CHARACTER);
        }
    }
    char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER)
}

impl PropertySource for PropertiesFile {
    fn name(&self) -> String {
        format!("file '{}'", self.path.display())
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "modular_injector",
                    file = %self.path.display(),
                    "No properties file to load"
                );
                Ok(BTreeMap::new())
            }
            Err(err) => Err(DiError::PropertySource {
                source_name: self.name(),
                reason: err.to_string(),
            }),
        }
    }
}

/// Environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentSource {
    vars: Option<Vec<(String, String)>>,
}

impl EnvironmentSource {
    /// Read the process environment on load
    pub fn system() -> Self {
        Self { vars: None }
    }

    /// Fixed variable list (tests, embedding)
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }
}

impl PropertySource for EnvironmentSource {
    fn name(&self) -> String {
        "environment".to_owned()
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        Ok(match &self.vars {
            Some(vars) => vars.iter().cloned().collect(),
            None => std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        })
    }
}

/// What `Context::load_properties` reads.
#[derive(Clone, Default)]
pub struct PropertiesConfig {
    /// Import the OS environment (applied last)
    pub use_environment_properties: bool,
    /// Properties file to import (applied first)
    pub properties_file: Option<PathBuf>,
    /// Explicit values (applied between file and environment)
    pub extra_properties: HashMap<String, PropertyValue>,
    /// Replaces the OS environment when set
    pub environment: Option<EnvironmentSource>,
}

impl PropertiesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self) -> Self {
        self.use_environment_properties = true;
        self
    }

    /// Import the given variables in place of the OS environment
    pub fn with_environment_source(mut self, source: EnvironmentSource) -> Self {
        self.use_environment_properties = true;
        self.environment = Some(source);
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.properties_file = Some(path.into());
        self
    }

    pub fn with_property<T: Injectable>(mut self, key: impl Into<String>, value: T) -> Self {
        self.extra_properties.insert(key.into(), Arc::new(value));
        self
    }

    /// Apply every configured origin to `registry`, in precedence order
    pub(crate) fn apply(&self, registry: &PropertyRegistry) -> Result<usize> {
        let mut total = 0;

        if let Some(path) = &self.properties_file {
            let source = PropertiesFile::new(path);
            let count = registry.import(source.load()?);
            #[cfg(feature = "logging")]
            debug!(target: "modular_injector", count, source = %source.name(), "Loaded properties");
            total += count;
        }

        if !self.extra_properties.is_empty() {
            let count = registry.add_all(&self.extra_properties);
            #[cfg(feature = "logging")]
            debug!(target: "modular_injector", count, source = "extras", "Loaded properties");
            total += count;
        }

        if self.use_environment_properties {
            let source = self.environment.clone().unwrap_or_else(EnvironmentSource::system);
            let count = registry.import(source.load()?);
            #[cfg(feature = "logging")]
            debug!(target: "modular_injector", count, source = %source.name(), "Loaded properties");
            total += count;
        }

        Ok(total)
    }
}

impl fmt::Debug for PropertiesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertiesConfig")
            .field("use_environment_properties", &self.use_environment_properties)
            .field("properties_file", &self.properties_file)
            .field("extra_properties", &self.extra_properties.len())
            .finish()
    }
}
