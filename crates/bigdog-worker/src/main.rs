//! Big Dog offline cache worker host
//!
//! Installs and activates the worker against the upstream origin, then serves
//! the app through it.

use bigdog_worker::config::{HostConfig, StorageBackend};
use bigdog_worker::server::{bootstrap, start_server, ServerState, SharedState};
use bigdog_worker::{CacheCoordinator, HttpNetwork, LocalScope, Result};
use cache_storage::{CacheStorage, FileStorage, MemoryStorage};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("bigdog_worker=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    let config = HostConfig::from_env()?;
    info!("Port: {}", config.port);
    info!("Public URL: {}", config.public_url);
    info!("Upstream URL: {}", config.upstream_url);

    let storage: Arc<dyn CacheStorage> = match config.backend {
        StorageBackend::File => {
            info!("Cache dir: {:?}", config.cache_dir);
            let storage = FileStorage::new(config.cache_dir.clone());
            storage.init().await?;
            Arc::new(storage)
        }
        StorageBackend::Memory => {
            info!("Using in-memory cache storage");
            Arc::new(MemoryStorage::new())
        }
    };

    let coordinator = Arc::new(CacheCoordinator::new(
        storage,
        Arc::new(HttpNetwork::new(
            config.upstream_url.clone(),
            config.public_url.clone(),
        )),
        Arc::new(LocalScope::new()),
        config.public_url.clone(),
    ));
    info!("Cache: {}", coordinator.cache_name());

    let state: SharedState = Arc::new(ServerState::new(coordinator));
    bootstrap(
        &state,
        config.install_attempts,
        Duration::from_secs(config.install_retry_secs),
    )
    .await?;

    start_server(state, config.port).await?;

    Ok(())
}
