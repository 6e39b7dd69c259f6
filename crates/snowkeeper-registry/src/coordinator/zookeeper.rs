use crate::coordinator::{child_path, path_prefixes, validate_path, Coordinator};
use crate::error::{CoordinationError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;
use zookeeper_client as zk;

/// Connection settings for [`ZooKeeperCoordinator`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct ZooKeeperSettings {
    /// Comma separated `host:port` list, optionally followed by a chroot.
    #[builder(setter(into))]
    pub connect_string: String,
    /// Upper bound on establishing the session.
    #[builder(default = Duration::from_secs(5))]
    pub connect_timeout: Duration,
}

/// A ZooKeeper implementation of [`Coordinator`].
///
/// One value holds one ZooKeeper session. Ephemeral nodes it creates are
/// tracked so that [`Coordinator::close`] can delete them before the session
/// goes away; dropping the value ends the session and lets the server expire
/// them instead.
pub struct ZooKeeperCoordinator {
    client: zk::Client,
    owned: Mutex<Vec<String>>,
    closed: AtomicBool,
}

fn map_zk_error(operation: &str, path: &str, err: zk::Error) -> CoordinationError {
    match err {
        zk::Error::NoNode => CoordinationError::NoNode(path.to_string()),
        zk::Error::ConnectionLoss => {
            CoordinationError::Unavailable(format!("{operation} {path}: connection loss"))
        }
        zk::Error::SessionExpired | zk::Error::ClientClosed => CoordinationError::Closed,
        other => {
            let message = format!("{operation} {path}: {other}");
            if message.to_ascii_lowercase().contains("timeout") {
                CoordinationError::Timeout(message)
            } else {
                CoordinationError::Operation(message)
            }
        }
    }
}

impl ZooKeeperCoordinator {
    /// Opens a session against the ensemble.
    ///
    /// A connect that does not complete within `connect_timeout` fails with
    /// [`CoordinationError::Timeout`]; a refused connection fails with
    /// [`CoordinationError::Unavailable`]. Both are retryable.
    pub async fn connect(settings: &ZooKeeperSettings) -> Result<Self> {
        debug!(connect_string = %settings.connect_string, "connecting to ZooKeeper");

        let connecting = zk::Client::connect(&settings.connect_string);
        let client = match tokio::time::timeout(settings.connect_timeout, connecting).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to connect to ZooKeeper");
                return Err(CoordinationError::Unavailable(format!(
                    "connect {}: {e}",
                    settings.connect_string
                )));
            }
            Err(_) => {
                warn!(timeout = ?settings.connect_timeout, "timed out connecting to ZooKeeper");
                return Err(CoordinationError::Timeout(format!(
                    "connect {} after {:?}",
                    settings.connect_string, settings.connect_timeout
                )));
            }
        };

        info!(connect_string = %settings.connect_string, "connected to ZooKeeper");
        Ok(Self {
            client,
            owned: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(CoordinationError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Coordinator for ZooKeeperCoordinator {
    async fn ensure_path(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        validate_path(path)?;

        let options = zk::CreateMode::Persistent.with_acls(zk::Acls::anyone_all());
        for prefix in path_prefixes(path) {
            trace!(path = prefix, "ensuring ZooKeeper node");
            match self.client.create(prefix, &[], &options).await {
                Ok(_) => debug!(path = prefix, "created persistent node"),
                Err(zk::Error::NodeExists) => {}
                Err(e) => return Err(map_zk_error("create", prefix, e)),
            }
        }
        Ok(())
    }

    async fn create_sequential_ephemeral(&self, parent: &str, prefix: &str) -> Result<String> {
        self.ensure_open()?;
        validate_path(parent)?;

        let base = child_path(parent, prefix);
        let options = zk::CreateMode::EphemeralSequential.with_acls(zk::Acls::anyone_all());
        let (_, sequence) = self
            .client
            .create(&base, &[], &options)
            .await
            .map_err(|e| map_zk_error("create", &base, e))?;

        // the server appends the zero-padded sequence to the requested name
        let path = format!("{base}{sequence}");
        self.owned.lock().push(path.clone());
        debug!(path = %path, "created ephemeral sequential node");
        Ok(path)
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        validate_path(path)?;

        let mut names = self
            .client
            .list_children(path)
            .await
            .map_err(|e| map_zk_error("list", path, e))?;
        names.sort();
        Ok(names)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.ensure_open()?;
        validate_path(path)?;

        self.client
            .delete(path, None)
            .await
            .map_err(|e| map_zk_error("delete", path, e))?;
        self.owned.lock().retain(|owned| owned != path);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let owned = std::mem::take(&mut *self.owned.lock());
        for path in owned {
            match self.client.delete(&path, None).await {
                Ok(()) | Err(zk::Error::NoNode) => debug!(path = %path, "released node"),
                // the session timeout will remove it
                Err(e) => warn!(path = %path, error = %e, "failed to delete node on close"),
            }
        }
        info!("closed ZooKeeper session");
        Ok(())
    }
}
