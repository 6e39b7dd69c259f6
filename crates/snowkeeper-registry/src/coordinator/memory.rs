use crate::coordinator::{child_path, parent_path, path_prefixes, validate_path, Coordinator};
use crate::error::{CoordinationError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Node {
    /// Session owning an ephemeral node; `None` for persistent nodes.
    owner: Option<u64>,
}

/// The shared namespace all sessions of an [`InMemoryCoordinator`] see.
#[derive(Debug, Default)]
struct Namespace {
    nodes: DashMap<String, Node>,
    /// Next sequential suffix per parent path.
    counters: DashMap<String, u64>,
    next_session: AtomicU64,
}

/// In-memory implementation of the [`Coordinator`] trait.
///
/// Each value is one session. [`InMemoryCoordinator::session`] opens another
/// session on the same namespace, which is how tests model several service
/// instances sharing one coordination service. Suffix assignment happens
/// under the per-parent counter's shard lock, so it is atomic across
/// sessions.
#[derive(Debug)]
pub struct InMemoryCoordinator {
    namespace: Arc<Namespace>,
    session_id: u64,
    closed: AtomicBool,
}

impl InMemoryCoordinator {
    /// Creates a fresh namespace with one session on it.
    pub fn new() -> Self {
        let namespace = Arc::new(Namespace::default());
        Self::open(namespace)
    }

    /// Opens another session on the same namespace.
    pub fn session(&self) -> Self {
        Self::open(Arc::clone(&self.namespace))
    }

    fn open(namespace: Arc<Namespace>) -> Self {
        let session_id = namespace.next_session.fetch_add(1, Ordering::SeqCst);
        Self {
            namespace,
            session_id,
            closed: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Simulates the service expiring this session: its ephemeral nodes are
    /// removed and every later call fails with [`CoordinationError::Closed`].
    pub fn expire(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.namespace
            .nodes
            .retain(|_, node| node.owner != Some(self.session_id));
        debug!(session_id = self.session_id, "in-memory session expired");
    }

    /// Whether a node exists, regardless of which session created it.
    pub fn exists(&self, path: &str) -> bool {
        self.namespace.nodes.contains_key(path)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CoordinationError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Coordinator for InMemoryCoordinator {
    async fn ensure_path(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        validate_path(path)?;

        for prefix in path_prefixes(path) {
            self.namespace
                .nodes
                .entry(prefix.to_string())
                .or_insert(Node { owner: None });
        }
        Ok(())
    }

    async fn create_sequential_ephemeral(&self, parent: &str, prefix: &str) -> Result<String> {
        self.ensure_open()?;
        validate_path(parent)?;
        if parent != "/" && !self.namespace.nodes.contains_key(parent) {
            return Err(CoordinationError::NoNode(parent.to_string()));
        }

        let mut counter = self
            .namespace
            .counters
            .entry(parent.to_string())
            .or_insert(0);
        let path = child_path(parent, &format!("{prefix}{:010}", *counter));
        *counter += 1;

        self.namespace.nodes.insert(
            path.clone(),
            Node {
                owner: Some(self.session_id),
            },
        );
        debug!(session_id = self.session_id, path = %path, "created sequential node");
        Ok(path)
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        validate_path(path)?;
        if path != "/" && !self.namespace.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }

        let mut names: Vec<String> = self
            .namespace
            .nodes
            .iter()
            .filter(|entry| parent_path(entry.key()) == Some(path))
            .filter_map(|entry| entry.key().rsplit('/').next().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        validate_path(path)?;

        let has_children = self
            .namespace
            .nodes
            .iter()
            .any(|entry| parent_path(entry.key()) == Some(path));
        if has_children {
            return Err(CoordinationError::Operation(format!(
                "node has children: {path}"
            )));
        }

        match self.namespace.nodes.remove(path) {
            Some(_) => Ok(()),
            None => Err(CoordinationError::NoNode(path.to_string())),
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.load(Ordering::SeqCst) {
            self.expire();
        }
        Ok(())
    }
}
