//! Disposable infrastructure for integration tests.

pub mod error;
pub mod zookeeper;

pub use error::{Result, TestInfraError};
pub use zookeeper::{ZooKeeperConfig, ZooKeeperServer};
