pub mod memory;
pub mod zookeeper;

use crate::error::{CoordinationError, Result};
use async_trait::async_trait;

/// The slice of a coordination service the allocator needs.
///
/// Implementations must guarantee that:
/// - [`create_sequential_ephemeral`](Coordinator::create_sequential_ephemeral)
///   assigns suffixes atomically, strictly increasing per parent path, so no
///   two callers ever receive the same suffix under the same parent;
/// - ephemeral nodes disappear when the session that created them ends,
///   whether by [`close`](Coordinator::close), crash or session timeout.
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// Creates `path` and any missing ancestors as persistent nodes.
    /// Succeeds if the path already exists.
    async fn ensure_path(&self, path: &str) -> Result<()>;

    /// Creates an ephemeral node named `<prefix><suffix>` under `parent` and
    /// returns its full path.
    async fn create_sequential_ephemeral(&self, parent: &str, prefix: &str) -> Result<String>;

    /// Lists the names (not full paths) of the children of `path`.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Deletes a childless node.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Ends the session, removing its ephemeral nodes right away instead of
    /// waiting for the session timeout.
    async fn close(&self) -> Result<()>;
}

/// Rejects paths that are not absolute, end in `/` or contain empty segments.
pub(crate) fn validate_path(path: &str) -> Result<()> {
    if path == "/" {
        return Ok(());
    }
    let valid = path.starts_with('/')
        && !path.ends_with('/')
        && path[1..].split('/').all(|segment| !segment.is_empty());
    if valid {
        Ok(())
    } else {
        Err(CoordinationError::InvalidPath(path.to_string()))
    }
}

/// Joins a parent path and a child name.
pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// The parent of an absolute path, or `None` for the root.
pub(crate) fn parent_path(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) if path.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(index) => Some(&path[..index]),
    }
}

/// Every proper ancestor of `path` except the root, outermost first, followed
/// by `path` itself.
pub(crate) fn path_prefixes(path: &str) -> Vec<&str> {
    path.match_indices('/')
        .skip(1)
        .map(|(index, _)| &path[..index])
        .chain(std::iter::once(path))
        .filter(|prefix| *prefix != "/")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_paths() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/worker-nodes").is_ok());
        assert!(validate_path("/a/b/c").is_ok());
        assert!(validate_path("worker-nodes").is_err());
        assert!(validate_path("/a/").is_err());
        assert!(validate_path("/a//b").is_err());
        assert!(validate_path("").is_err());
    }

    #[test]
    fn joins_and_splits_paths() {
        assert_eq!(child_path("/", "a"), "/a");
        assert_eq!(child_path("/a", "b"), "/a/b");
        assert_eq!(parent_path("/a/b"), Some("/a"));
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn lists_prefixes_outermost_first() {
        assert_eq!(path_prefixes("/a/b/c"), vec!["/a", "/a/b", "/a/b/c"]);
        assert_eq!(path_prefixes("/a"), vec!["/a"]);
        assert!(path_prefixes("/").is_empty());
    }
}
