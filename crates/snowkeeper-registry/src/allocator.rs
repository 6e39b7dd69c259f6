use crate::coordinator::Coordinator;
use crate::error::{AllocationError, CoordinationError};
use crate::retry::RetryPolicy;
use snowkeeper_flake::WorkerIdentity;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

/// Registrations beyond this many live entries would alias identities.
pub const MAX_LIVE_REGISTRATIONS: usize = 1024;

/// Configures a [`WorkerIdAllocator`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct AllocatorSettings {
    /// Persistent node under which every instance registers.
    #[builder(default = "/worker-nodes".to_string(), setter(into))]
    pub root_path: String,
    /// Name prefix of the registration nodes; the service appends the
    /// sequence number.
    #[builder(default = "worker-node-".to_string(), setter(into))]
    pub node_prefix: String,
    /// Backoff applied to every coordination call.
    #[builder(default)]
    pub retry: RetryPolicy,
    /// How many registration nodes to try before giving up on collisions.
    #[builder(default = 64)]
    pub max_attempts: u32,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub identity: WorkerIdentity,
    /// Sequence number the coordination service assigned to the node.
    pub sequence: u64,
    /// Full path of the ephemeral registration node.
    pub node_path: String,
}

/// Assigns this process a worker identity no other live instance holds.
///
/// The identity is derived from the sequence number of an ephemeral
/// sequential node, so uniqueness rests on the coordination service never
/// handing out the same suffix twice. The node lives as long as the session;
/// there is no release call besides [`WorkerIdAllocator::close`].
///
/// Once the suffix counter passes 1024, derived identities start to repeat.
/// The allocator then checks live siblings: if one with a lower sequence maps
/// to the same identity, its own node is dropped and a new one registered.
/// The lower sequence always keeps the identity, so two racing instances
/// cannot both keep it.
pub struct WorkerIdAllocator<C: Coordinator> {
    coordinator: C,
    settings: AllocatorSettings,
}

impl<C: Coordinator> WorkerIdAllocator<C> {
    pub fn new(coordinator: C, settings: AllocatorSettings) -> Self {
        Self {
            coordinator,
            settings,
        }
    }

    pub fn coordinator(&self) -> &C {
        &self.coordinator
    }

    pub fn settings(&self) -> &AllocatorSettings {
        &self.settings
    }

    pub async fn allocate(&self) -> Result<Allocation, AllocationError> {
        let root = self.settings.root_path.as_str();
        let prefix = self.settings.node_prefix.as_str();
        let retry = &self.settings.retry;

        retry
            .run("ensure root path", || self.coordinator.ensure_path(root))
            .await?;

        let mut last_sequence = 0;
        for attempt in 1..=self.settings.max_attempts {
            let node_path = retry
                .run("create registration node", || {
                    self.coordinator.create_sequential_ephemeral(root, prefix)
                })
                .await?;
            let sequence = match parse_sequence(&node_path, prefix) {
                Some(sequence) => sequence,
                None => {
                    self.release(&node_path).await;
                    return Err(AllocationError::InvalidNodePath(node_path));
                }
            };
            last_sequence = sequence;
            let identity = WorkerIdentity::from_sequence(sequence);
            debug!(attempt, sequence, %identity, node_path = %node_path, "registered");

            let siblings = retry
                .run("list registrations", || self.coordinator.children(root))
                .await?;
            let live: Vec<u64> = siblings
                .iter()
                .filter_map(|name| parse_sequence(name, prefix))
                .collect();

            if live.len() > MAX_LIVE_REGISTRATIONS {
                warn!(live = live.len(), "too many live registrations");
                self.release(&node_path).await;
                return Err(AllocationError::AllocationExhausted {
                    sequence,
                    live: live.len(),
                });
            }

            let holder = live.iter().copied().find(|&other| {
                other < sequence && WorkerIdentity::from_sequence(other) == identity
            });
            match holder {
                None => {
                    info!(
                        worker_id = identity.worker_id(),
                        datacenter_id = identity.datacenter_id(),
                        sequence,
                        node_path = %node_path,
                        "allocated worker identity"
                    );
                    return Ok(Allocation {
                        identity,
                        sequence,
                        node_path,
                    });
                }
                Some(holder) => {
                    warn!(sequence, holder, %identity, "identity held by a live instance, re-registering");
                    self.release(&node_path).await;
                }
            }
        }

        Err(AllocationError::AllocationExhausted {
            sequence: last_sequence,
            live: self
                .coordinator
                .children(root)
                .await
                .map(|names| names.len())
                .unwrap_or_default(),
        })
    }

    /// Closes the coordination session, deleting the registration at once so
    /// the identity can be reused without waiting out the session timeout.
    pub async fn close(&self) -> Result<(), CoordinationError> {
        self.coordinator.close().await
    }

    async fn release(&self, node_path: &str) {
        if let Err(e) = self.coordinator.delete(node_path).await {
            // the node goes away with the session anyway
            warn!(node_path, error = %e, "failed to delete registration node");
        }
    }
}

/// Extracts the sequence number from a node name or full node path.
fn parse_sequence(node: &str, prefix: &str) -> Option<u64> {
    let name = node.rsplit('/').next()?;
    name.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::memory::InMemoryCoordinator;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_settings() -> AllocatorSettings {
        AllocatorSettings::builder()
            .retry(
                RetryPolicy::builder()
                    .base_delay(Duration::from_millis(1))
                    .max_delay(Duration::from_millis(2))
                    .max_retries(2)
                    .build(),
            )
            .build()
    }

    #[test]
    fn parses_sequence_from_names_and_paths() {
        assert_eq!(
            parse_sequence("/worker-nodes/worker-node-0000000042", "worker-node-"),
            Some(42)
        );
        assert_eq!(parse_sequence("worker-node-0000000007", "worker-node-"), Some(7));
        assert_eq!(parse_sequence("other-0000000007", "worker-node-"), None);
        assert_eq!(parse_sequence("worker-node-abc", "worker-node-"), None);
    }

    #[tokio::test]
    async fn sequential_registrations_yield_derived_identities() {
        let namespace = InMemoryCoordinator::new();
        let mut identities = HashSet::new();

        for sequence in 0..5_u64 {
            let allocator = WorkerIdAllocator::new(namespace.session(), fast_settings());
            let allocation = allocator.allocate().await.unwrap();

            assert_eq!(allocation.sequence, sequence);
            assert_eq!(
                allocation.identity,
                WorkerIdentity::new((sequence % 32) as u8, ((sequence / 32) % 32) as u8).unwrap()
            );
            assert!(identities.insert(allocation.identity));
        }
        assert_eq!(identities.len(), 5);
    }

    #[tokio::test]
    async fn identity_spans_datacenters_after_32_registrations() {
        let namespace = InMemoryCoordinator::new();
        let mut sessions = Vec::new();
        let mut last = None;
        for _ in 0..34 {
            let allocator = WorkerIdAllocator::new(namespace.session(), fast_settings());
            last = Some(allocator.allocate().await.unwrap());
            sessions.push(allocator);
        }
        let last = last.unwrap();
        assert_eq!(last.sequence, 33);
        assert_eq!(last.identity.worker_id(), 1);
        assert_eq!(last.identity.datacenter_id(), 1);
    }

    #[tokio::test]
    async fn close_frees_the_registration() {
        let namespace = InMemoryCoordinator::new();
        let allocator = WorkerIdAllocator::new(namespace.session(), fast_settings());
        let allocation = allocator.allocate().await.unwrap();
        assert!(namespace.exists(&allocation.node_path));

        allocator.close().await.unwrap();
        assert!(!namespace.exists(&allocation.node_path));
    }

    #[tokio::test]
    async fn colliding_identity_is_skipped() {
        let namespace = InMemoryCoordinator::new();
        namespace.ensure_path("/worker-nodes").await.unwrap();

        // sequence 0 stays registered and holds identity (0, 0)
        let holder = namespace.session();
        holder
            .create_sequential_ephemeral("/worker-nodes", "worker-node-")
            .await
            .unwrap();
        // burn sequences 1..1024 so the next registration wraps around
        let churn = namespace.session();
        for _ in 1..1024 {
            let path = churn
                .create_sequential_ephemeral("/worker-nodes", "worker-node-")
                .await
                .unwrap();
            churn.delete(&path).await.unwrap();
        }

        let allocator = WorkerIdAllocator::new(namespace.session(), fast_settings());
        let allocation = allocator.allocate().await.unwrap();

        // 1024 collides with the holder of 0; 1025 maps to (1, 0)
        assert_eq!(allocation.sequence, 1025);
        assert_eq!(allocation.identity, WorkerIdentity::new(1, 0).unwrap());
        assert!(!namespace.exists("/worker-nodes/worker-node-0000001024"));
    }

    #[tokio::test]
    async fn too_many_live_registrations_is_exhausted() {
        let namespace = InMemoryCoordinator::new();
        namespace.ensure_path("/worker-nodes").await.unwrap();
        let crowd = namespace.session();
        for _ in 0..MAX_LIVE_REGISTRATIONS {
            crowd
                .create_sequential_ephemeral("/worker-nodes", "worker-node-")
                .await
                .unwrap();
        }

        let allocator = WorkerIdAllocator::new(namespace.session(), fast_settings());
        let result = allocator.allocate().await;

        assert!(matches!(
            result,
            Err(AllocationError::AllocationExhausted {
                sequence: 1024,
                live: 1025
            })
        ));
        assert!(!namespace.exists("/worker-nodes/worker-node-0000001024"));
    }

    /// Fails the first `failures` calls with a transient error.
    struct FlakyCoordinator {
        inner: InMemoryCoordinator,
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyCoordinator {
        fn check(&self) -> Result<()> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(CoordinationError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Coordinator for FlakyCoordinator {
        async fn ensure_path(&self, path: &str) -> Result<()> {
            self.check()?;
            self.inner.ensure_path(path).await
        }

        async fn create_sequential_ephemeral(&self, parent: &str, prefix: &str) -> Result<String> {
            self.check()?;
            self.inner.create_sequential_ephemeral(parent, prefix).await
        }

        async fn children(&self, path: &str) -> Result<Vec<String>> {
            self.check()?;
            self.inner.children(path).await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.inner.delete(path).await
        }

        async fn close(&self) -> Result<()> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let coordinator = FlakyCoordinator {
            inner: InMemoryCoordinator::new(),
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let allocator = WorkerIdAllocator::new(coordinator, fast_settings());

        let allocation = allocator.allocate().await.unwrap();
        assert_eq!(allocation.sequence, 0);
    }

    #[tokio::test]
    async fn unreachable_service_is_reported() {
        let coordinator = FlakyCoordinator {
            inner: InMemoryCoordinator::new(),
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let allocator = WorkerIdAllocator::new(coordinator, fast_settings());

        let result = allocator.allocate().await;
        assert!(matches!(
            result,
            Err(AllocationError::CoordinationUnavailable {
                operation: "ensure root path",
                attempts: 3,
                ..
            })
        ));
        assert_eq!(allocator.coordinator().calls.load(Ordering::SeqCst), 3);
    }
}
