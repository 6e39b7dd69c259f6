mod cli;

use crate::cli::{CoordinatorArg, LogFormat, CLI};
use anyhow::Context;
use clap::Parser;
use snowkeeper_flake::{Snowflake, SnowflakeSettings};
use snowkeeper_gateway::{App, AppState};
use snowkeeper_registry::{
    AllocatorSettings, Coordinator, InMemoryCoordinator, WorkerIdAllocator, ZooKeeperCoordinator,
    ZooKeeperSettings,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::try_parse()?;
    init_tracing(config.log_format);

    info!(
        listen_addr = %config.listen_addr,
        coordinator = %config.coordinator,
        root_path = %config.root_path,
        epoch = %config.epoch,
        "starting snowkeeper"
    );

    match config.coordinator {
        CoordinatorArg::InMemory => {
            warn!("in-memory coordinator only guarantees unique ids within this process");
            run_server(config, InMemoryCoordinator::new()).await
        }
        CoordinatorArg::ZooKeeper => {
            let settings = ZooKeeperSettings::builder()
                .connect_string(config.zookeeper_addr.as_str())
                .connect_timeout(config.connect_timeout())
                .build();
            let coordinator = config
                .retry_policy()
                .run("connect", || ZooKeeperCoordinator::connect(&settings))
                .await
                .with_context(|| format!("cannot reach ZooKeeper at {}", config.zookeeper_addr))?;
            run_server(config, coordinator).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

async fn run_server<C: Coordinator>(config: CLI, coordinator: C) -> anyhow::Result<()> {
    let allocator = WorkerIdAllocator::new(
        coordinator,
        AllocatorSettings::builder()
            .root_path(config.root_path.as_str())
            .node_prefix(config.node_prefix.as_str())
            .retry(config.retry_policy())
            .build(),
    );
    let allocation = allocator
        .allocate()
        .await
        .context("failed to allocate a worker identity")?;

    let shutdown = CancellationToken::new();
    let settings = SnowflakeSettings::builder()
        .identity(allocation.identity)
        .start_epoch(config.epoch)
        .max_backward_drift(config.max_backward_drift())
        .build();
    let generator = Snowflake::new(settings)
        .context("invalid generator settings")?
        .with_shutdown(shutdown.clone());

    info!(
        worker_id = allocation.identity.worker_id(),
        datacenter_id = allocation.identity.datacenter_id(),
        node_path = %allocation.node_path,
        "generator ready"
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(listen_addr = %listener.local_addr()?, "starting gateway server");

    let router = App::router(AppState::new(Arc::new(generator)));
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await;

    if let Err(e) = allocator.close().await {
        warn!(error = %e, "failed to close coordination session");
    }
    info!("snowkeeper stopped");

    served.context("server error")
}

/// Resolves on Ctrl-C or SIGTERM and cancels `shutdown`, which also stops
/// any generator call still waiting on the clock.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
    shutdown.cancel();
}
