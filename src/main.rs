use std::sync::Arc;

use flatpg::config::ServerConfig;
use flatpg::engine::Engine;
use flatpg::server::Server;
use flatpg::storage::FileStore;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

// NOTE: Production improvements needed:
// - Set up signal handlers for graceful shutdown
// - Reload data files when they change on disk

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(ServerConfig::from_env()?);

    let store = FileStore::new(config.data_dir.clone());
    let engine = Arc::new(Engine::new(store));

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(
        addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        auth = config.credentials().is_some(),
        "flatpg listening"
    );

    let server = Server::new(listener, engine, config);
    server.serve().await?;

    Ok(())
}
