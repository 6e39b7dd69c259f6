use clap::{Parser, ValueEnum};
use jiff::Timestamp;
use snowkeeper_registry::RetryPolicy;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

pub const LISTEN_ADDR_ENV: &str = "SNOWKEEPER_LISTEN_ADDR";
pub const COORDINATOR_ENV: &str = "SNOWKEEPER_COORDINATOR";
pub const ZOOKEEPER_ADDR_ENV: &str = "SNOWKEEPER_ZOOKEEPER_ADDR";
pub const ROOT_PATH_ENV: &str = "SNOWKEEPER_ROOT_PATH";
pub const NODE_PREFIX_ENV: &str = "SNOWKEEPER_NODE_PREFIX";
pub const EPOCH_ENV: &str = "SNOWKEEPER_EPOCH";
pub const MAX_BACKWARD_DRIFT_MS_ENV: &str = "SNOWKEEPER_MAX_BACKWARD_DRIFT_MS";
pub const CONNECT_TIMEOUT_MS_ENV: &str = "SNOWKEEPER_CONNECT_TIMEOUT_MS";
pub const MAX_RETRIES_ENV: &str = "SNOWKEEPER_MAX_RETRIES";
pub const LOG_FORMAT_ENV: &str = "SNOWKEEPER_LOG_FORMAT";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_ZOOKEEPER_ADDR: &str = "127.0.0.1:2181";
pub const DEFAULT_ROOT_PATH: &str = "/worker-nodes";
pub const DEFAULT_NODE_PREFIX: &str = "worker-node-";
pub const DEFAULT_EPOCH: &str = "2010-11-04T01:42:54.657Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CoordinatorArg {
    #[value(name = "zookeeper")]
    ZooKeeper,
    #[value(name = "in-memory")]
    InMemory,
}

impl Display for CoordinatorArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorArg::ZooKeeper => write!(f, "zookeeper"),
            CoordinatorArg::InMemory => write!(f, "in-memory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "snowkeeper", about = "Distributed 63-bit id service")]
pub struct CLI {
    #[arg(long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    #[arg(
        long,
        env = COORDINATOR_ENV,
        value_enum,
        default_value_t = CoordinatorArg::ZooKeeper
    )]
    pub coordinator: CoordinatorArg,

    #[arg(long, env = ZOOKEEPER_ADDR_ENV, default_value = DEFAULT_ZOOKEEPER_ADDR)]
    pub zookeeper_addr: String,

    #[arg(long, env = ROOT_PATH_ENV, default_value = DEFAULT_ROOT_PATH)]
    pub root_path: String,

    #[arg(long, env = NODE_PREFIX_ENV, default_value = DEFAULT_NODE_PREFIX)]
    pub node_prefix: String,

    /// Zero point of the timestamp field. Changing it for a running
    /// deployment breaks the ordering of ids.
    #[arg(long, env = EPOCH_ENV, default_value = DEFAULT_EPOCH)]
    pub epoch: Timestamp,

    #[arg(long, env = MAX_BACKWARD_DRIFT_MS_ENV, default_value_t = 5)]
    pub max_backward_drift_ms: u64,

    #[arg(long, env = CONNECT_TIMEOUT_MS_ENV, default_value_t = 5_000)]
    pub connect_timeout_ms: u64,

    #[arg(long, env = MAX_RETRIES_ENV, default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl CLI {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder().max_retries(self.max_retries).build()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn max_backward_drift(&self) -> Duration {
        Duration::from_millis(self.max_backward_drift_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cli = CLI::try_parse_from(["snowkeeper"]).unwrap();
        assert_eq!(cli.listen_addr.to_string(), DEFAULT_LISTEN_ADDR);
        assert_eq!(cli.coordinator, CoordinatorArg::ZooKeeper);
        assert_eq!(cli.root_path, "/worker-nodes");
        assert_eq!(cli.node_prefix, "worker-node-");
        assert_eq!(cli.epoch.as_millisecond(), 1_288_834_974_657);
        assert_eq!(cli.max_backward_drift(), Duration::from_millis(5));
        assert_eq!(cli.retry_policy().max_retries, 3);
    }

    #[test]
    fn parses_overrides() {
        let cli = CLI::try_parse_from([
            "snowkeeper",
            "--coordinator",
            "in-memory",
            "--epoch",
            "2024-01-01T00:00:00Z",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.coordinator, CoordinatorArg::InMemory);
        assert_eq!(cli.epoch.as_second(), 1_704_067_200);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
