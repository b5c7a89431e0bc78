//! Hierarchical scope names
//!
//! A [`Path`] names the scope a definition was declared in. Module trees
//! nest paths (`"A"`, `"A.B"`, ...) and releasing a path tears down every
//! definition declared at or under it.

use ahash::RandomState;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Separator between path segments in the string form
pub const PATH_SEPARATOR: char = '.';

/// Immutable hierarchical scope identifier.
///
/// Paths have value semantics: two paths are equal when their segment
/// chains are equal. Cloning is cheap (shared parent chain).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Path {
    inner: Option<Arc<PathNode>>,
}

#[derive(PartialEq, Eq, Hash)]
struct PathNode {
    segment: String,
    parent: Path,
}

impl Path {
    /// The root path (empty string form)
    #[inline]
    pub const fn root() -> Self {
        Self { inner: None }
    }

    /// Parse a dotted path string (`""` is the root, `"A.B"` is `B` under `A`)
    #[inline]
    pub fn parse(path: &str) -> Self {
        Self::root().child(path)
    }

    /// Child path under `self`.
    ///
    /// A dotted segment nests one level per part (`"a.b"` is two levels);
    /// empty parts are skipped, so `""` yields `self`.
    pub fn child(&self, segment: &str) -> Self {
        segment
            .split(PATH_SEPARATOR)
            .filter(|part| !part.is_empty())
            .fold(self.clone(), |parent, part| Self {
                inner: Some(Arc::new(PathNode {
                    segment: part.to_owned(),
                    parent,
                })),
            })
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.inner.is_none()
    }

    /// Last segment (empty for the root)
    pub fn segment(&self) -> &str {
        self.inner.as_ref().map_or("", |node| node.segment.as_str())
    }

    /// Parent path (`None` for the root)
    pub fn parent(&self) -> Option<&Path> {
        self.inner.as_ref().map(|node| &node.parent)
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// True when `other` equals this path or is nested under it
    pub fn contains(&self, other: &Path) -> bool {
        let own_depth = self.depth();
        let mut other_depth = other.depth();
        if other_depth < own_depth {
            return false;
        }
        let mut current = other;
        while other_depth > own_depth {
            match current.parent() {
                Some(parent) => current = parent,
                None => return false,
            }
            other_depth -= 1;
        }
        current == self
    }

    fn write_segments(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.inner {
            if !node.parent.is_root() {
                node.parent.write_segments(f)?;
                write!(f, "{PATH_SEPARATOR}")?;
            }
            f.write_str(&node.segment)?;
        }
        Ok(())
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_segments(f)
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

/// Known paths and the definition names declared directly at each of them.
pub struct PathRegistry {
    paths: DashMap<Path, BTreeSet<String>, RandomState>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self {
            paths: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Build the path of a module declared with `segment` under `parent`.
    ///
    /// Dotted segments nest (`"a.b"` under `X` gives `X.a.b`); an empty
    /// segment keeps the parent path. Equal inputs give equal paths.
    pub fn make_path(&self, segment: &str, parent: Option<&Path>) -> Path {
        parent.cloned().unwrap_or_default().child(segment)
    }

    /// Record a path as known (idempotent)
    pub fn save_path(&self, path: &Path) {
        if !self.paths.contains_key(path) {
            self.paths.entry(path.clone()).or_default();
        }
    }

    /// Record `name` as declared at `path`
    pub fn add_definition(&self, path: &Path, name: &str) {
        self.paths
            .entry(path.clone())
            .or_default()
            .insert(name.to_owned());
    }

    /// Forget `name` at `path` (the definition moved or was replaced)
    pub fn remove_definition(&self, path: &Path, name: &str) {
        if let Some(mut names) = self.paths.get_mut(path) {
            names.remove(name);
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains_key(path)
    }

    /// Names declared at or under `path`
    pub fn names_under(&self, path: &Path) -> BTreeSet<String> {
        self.paths
            .iter()
            .filter(|entry| path.contains(entry.key()))
            .flat_map(|entry| entry.value().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Drop every path at or under `path`, returning the names they held
    pub fn release(&self, path: &Path) -> BTreeSet<String> {
        let doomed: Vec<Path> = self
            .paths
            .iter()
            .filter(|entry| path.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        doomed
            .into_iter()
            .filter_map(|p| self.paths.remove(&p))
            .flat_map(|(_, names)| names)
            .collect()
    }

    /// All known paths, sorted by string form
    pub fn paths(&self) -> Vec<Path> {
        let mut paths: Vec<Path> = self.paths.iter().map(|e| e.key().clone()).collect();
        paths.sort_by_cached_key(|p| p.to_string());
        paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn clear(&self) {
        self.paths.clear();
    }
}

impl Default for PathRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PathRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathRegistry")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_display() {
        assert_eq!(Path::root().to_string(), "");
        assert_eq!(Path::root().child("A").to_string(), "A");
        assert_eq!(Path::root().child("A").child("B").to_string(), "A.B");
        assert_eq!(Path::parse("A.B.C").to_string(), "A.B.C");
    }

    #[test]
    fn test_parse_root() {
        assert!(Path::parse("").is_root());
        assert!(Path::parse("..").is_root());
    }

    #[test]
    fn test_make_path_is_idempotent() {
        let registry = PathRegistry::new();
        let parent = registry.make_path("A", None);
        let p1 = registry.make_path("B", Some(&parent));
        let p2 = registry.make_path("B", Some(&parent));

        assert_eq!(p1, p2);

        let mut map = HashMap::new();
        map.insert(p1, 1);
        assert_eq!(map.get(&p2), Some(&1));
        assert_eq!(map.get(&Path::parse("A.B")), Some(&1));
    }

    #[test]
    fn test_make_path_empty_segment_keeps_parent() {
        let registry = PathRegistry::new();
        let parent = Path::parse("A");
        assert_eq!(registry.make_path("", Some(&parent)), parent);
        assert!(registry.make_path("", None).is_root());
        assert_eq!(registry.make_path("x.y", Some(&parent)), Path::parse("A.x.y"));
    }

    #[test]
    fn test_dotted_child_nests() {
        let dotted = Path::root().child("a.b");
        assert_eq!(dotted, Path::parse("a.b"));
        assert_eq!(dotted.depth(), 2);
        assert_eq!(dotted.segment(), "b");
        assert!(Path::parse("a").contains(&dotted));
        assert_eq!(Path::parse("x").child(".y..z."), Path::parse("x.y.z"));

        let registry = PathRegistry::new();
        registry.add_definition(&dotted, "n");
        assert!(registry.release(&Path::parse("a.b")).contains("n"));
    }

    #[test]
    fn test_contains() {
        let a = Path::parse("A");
        let ab = Path::parse("A.B");
        let b = Path::parse("B");

        assert!(Path::root().contains(&ab));
        assert!(a.contains(&a));
        assert!(a.contains(&ab));
        assert!(!ab.contains(&a));
        assert!(!a.contains(&b));
        assert!(!Path::parse("AB").contains(&ab));
    }

    #[test]
    fn test_release_returns_nested_names() {
        let registry = PathRegistry::new();
        let a = Path::parse("A");
        let ab = Path::parse("A.B");
        let b = Path::parse("B");
        registry.save_path(&Path::root());
        registry.add_definition(&a, "a1");
        registry.add_definition(&ab, "ab1");
        registry.add_definition(&b, "b1");

        let released = registry.release(&a);
        assert_eq!(released.into_iter().collect::<Vec<_>>(), vec!["a1", "ab1"]);
        assert!(!registry.contains(&a));
        assert!(!registry.contains(&ab));
        assert!(registry.contains(&b));
        assert!(registry.contains(&Path::root()));
    }
}
