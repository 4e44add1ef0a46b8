//! ZigSight Service - Telemetry collector and HTTP API.
//!
//! Run with: `cargo run -p zigsight-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use zigsight_service::{AppState, Collector, Config, SourceKind, api, ws};

/// ZigSight Service - Zigbee mesh analytics collector and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "zigsight-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Telemetry source (overrides config).
    #[arg(short, long, value_enum)]
    source: Option<SourceKind>,

    /// Disable background collector (API only mode).
    #[arg(long)]
    no_collector: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zigsight_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("Ignoring unreadable default config: {}", e);
            Config::default()
        }),
    };

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(source) = args.source {
        config.source.kind = source;
    }
    config.validate()?;

    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(config);

    let collector_task = if args.no_collector {
        info!("Background collector disabled");
        None
    } else {
        Some(Collector::new(Arc::clone(&state)).start().await?)
    };

    let app = Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    // Make sure the collector closes its source even if the server stopped on its own.
    state.shutdown.cancel();
    if let Some(task) = collector_task
        && let Err(e) = task.await
    {
        warn!("Collector task failed: {}", e);
    }

    info!("Server stopped");
    Ok(())
}
