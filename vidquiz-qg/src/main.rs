//! vidquiz-qg - question generation service
//!
//! Listens for upload-complete signals, transcribes each video through the remote
//! inference service, splits the transcript into segments and generates
//! multiple-choice questions per segment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vidquiz_common::config::{load_toml_config, resolve_config_path, resolve_root_folder};
use vidquiz_common::events::EventBus;

use vidquiz_qg::config::TomlConfig;
use vidquiz_qg::services::HttpInferenceApi;
use vidquiz_qg::AppState;

/// Command-line arguments for vidquiz-qg
#[derive(Parser, Debug)]
#[command(name = "vidquiz-qg")]
#[command(about = "Video question generation service")]
#[command(version)]
struct Args {
    /// Bootstrap TOML config file
    #[arg(short, long, env = "VIDQUIZ_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides [server] port)
    #[arg(short, long, env = "VIDQUIZ_QG_PORT")]
    port: Option<u16>,

    /// Data root folder holding the database
    #[arg(short, long, env = "VIDQUIZ_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is loaded before tracing so [logging] level can seed the filter
    let config_path = resolve_config_path(args.config.as_deref(), "vidquiz-qg");
    let config: TomlConfig =
        load_toml_config(config_path.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vidquiz-qg (question generation) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config: {}", path.display());
    }

    config.validate().context("Invalid configuration")?;

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), config.root_folder.as_deref());
    let db_path = root_folder.join(vidquiz_qg::db::DATABASE_FILE);
    info!("Database: {}", db_path.display());

    let db_pool = vidquiz_qg::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(256);

    let api = HttpInferenceApi::new(&config.remote, &config.pipeline)
        .context("Failed to build remote inference client")?;
    info!(
        transcription_url = %config.remote.transcription_url,
        generation_url = %config.remote.generation_url,
        "Remote inference client configured"
    );

    let state = AppState::new(db_pool, event_bus, Arc::new(api), config.pipeline.clone());
    let workers = state.workers.clone();
    let app = vidquiz_qg::build_router(state);

    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    workers.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
