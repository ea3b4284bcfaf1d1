pub mod error;
pub mod modules;
pub mod proxy; // Gateway service module

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use proxy::{AppState, AxumServer};

/// Run the gateway until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    // Initialize logger
    let log_dir = std::env::var_os("LOG_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let _log_guard = modules::init_logger(log_dir.as_deref());

    let config = match modules::load_app_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let state = AppState::new(config)?;
    let (server, handle) = AxumServer::start(state).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.stop();
    handle.await?;
    Ok(())
}
