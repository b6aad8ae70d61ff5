//! Core data types: `Snippet` and `Dependency` (spec.md §3).

use std::collections::HashSet;

use uuid::Uuid;

/// A screened snippet, carrying its text, discovered third-party imports,
/// and the unique on-container path it will be copied to.
///
/// Invariant: once constructed, `path` either exists on the container or
/// is actively being cleaned up — the Executor never returns without
/// attempting removal (spec.md §3).
#[derive(Debug, Clone)]
pub struct Snippet {
    pub source: String,
    pub imports: HashSet<String>,
    pub path: String,
}

impl Snippet {
    pub fn new(source: String, imports: HashSet<String>) -> Self {
        let path = format!("/tmp/{}.py", Uuid::new_v4());
        Self { source, imports, path }
    }
}

/// Whether a dependency was pre-installed at construction (`Cached`, never
/// removed) or installed for a single run (`Transient`, must be removed on
/// every exit path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Cached,
    Transient,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub name: String,
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn cached(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: DependencyKind::Cached }
    }

    pub fn transient(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: DependencyKind::Transient }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_path_is_under_tmp() {
        let snippet = Snippet::new("print(1)".to_string(), HashSet::new());
        assert!(snippet.path.starts_with("/tmp/"));
        assert!(snippet.path.ends_with(".py"));
    }

    #[test]
    fn test_snippet_paths_are_unique() {
        let a = Snippet::new("x".to_string(), HashSet::new());
        let b = Snippet::new("x".to_string(), HashSet::new());
        assert_ne!(a.path, b.path);
    }
}
