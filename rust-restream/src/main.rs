use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use rust_restream::api::{ApiServer, ApiServerConfig, AppState};
use rust_restream::config::AppConfig;
use rust_restream::process::{FfmpegEngine, StreamEngine};
use rust_restream::store::{ConfigStore, JsonFileStore};
use rust_restream::supervisor::StreamManager;
use rust_restream::{logging, utils};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    let (logging_config, _log_guard) = logging::init_logging(&config.log_dir)?;
    info!(log_dir = %logging_config.log_dir().display(), "Logging initialized");
    let cancel = CancellationToken::new();
    logging_config.start_retention_cleanup(cancel.child_token());

    utils::fs::ensure_dir_all_with_op("creating data directory", &config.data_dir).await?;
    if let Some(parent) = config.streams_file.parent() {
        utils::fs::ensure_dir_all_with_op("creating streams file directory", parent).await?;
    }
    let store = Arc::new(ConfigStore::new(Arc::new(JsonFileStore::new(
        &config.streams_file,
    ))));
    info!(path = %config.streams_file.display(), "Using stream store");

    let engine = Arc::new(FfmpegEngine::with_config(config.encoder.clone()));
    match engine.version() {
        Some(version) => info!(%version, "Encoder available"),
        None => warn!(
            binary = %config.encoder.binary_path,
            "Encoder binary not usable; streams will fail to start"
        ),
    }

    let manager = Arc::new(StreamManager::new(store, engine, config.supervisor));
    let restored = manager.restore().await;
    info!(restored, "rust-restream initialized successfully");

    let state = AppState::new(manager.clone()).with_logging_config(logging_config);
    let server = ApiServer::new(ApiServerConfig::from(&config), state);
    let server_token = server.cancel_token();

    tokio::spawn(async move {
        shutdown_signal().await;
        server_token.cancel();
    });

    if let Err(e) = server.run().await {
        error!(error = %e, "API server failed");
    }

    manager.shutdown().await;
    cancel.cancel();
    info!("Shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
