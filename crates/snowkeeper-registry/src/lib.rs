//! Startup worker identity allocation through a coordination service.
//!
//! A [`WorkerIdAllocator`] registers one ephemeral sequential node and
//! derives a [`WorkerIdentity`](snowkeeper_flake::WorkerIdentity) from its
//! sequence number. The service is reached through the [`Coordinator`]
//! trait, implemented for ZooKeeper and for an in-memory namespace.

pub mod allocator;
pub mod coordinator;
pub mod error;
pub mod retry;

pub use allocator::{Allocation, AllocatorSettings, WorkerIdAllocator, MAX_LIVE_REGISTRATIONS};
pub use coordinator::memory::InMemoryCoordinator;
pub use coordinator::zookeeper::{ZooKeeperCoordinator, ZooKeeperSettings};
pub use coordinator::Coordinator;
pub use error::{AllocationError, CoordinationError, Result};
pub use retry::RetryPolicy;
