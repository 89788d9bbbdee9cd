mod cli;
mod error;
mod routes;
mod state;

use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use perpscope_core::{AppConfig, RefreshPipeline, RefreshScheduler, ReqwestHttpClient, SnapshotStore};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::StartupError;
use crate::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "perpscope stopped");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    info!(
        refresh_secs = config.refresh_interval.as_secs(),
        interval = %config.history.interval,
        lookback_hours = config.history.lookback_hours,
        hyperliquid = config.hyperliquid_enabled,
        coingecko = config.coingecko_enabled,
        "starting perpscope"
    );

    let pipeline = RefreshPipeline::bootstrap(&config, Arc::new(ReqwestHttpClient::new())).await;
    let universe = pipeline.universe().clone();
    let store = SnapshotStore::new();
    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::new(pipeline),
        store.clone(),
        config.refresh_interval,
    ));
    let refresh_task = scheduler.spawn();

    let mut app = routes::api_router();
    if cli.static_dir.is_dir() {
        app = app.fallback_service(ServeDir::new(&cli.static_dir).append_index_html_on_directories(true));
    } else {
        warn!(dir = %cli.static_dir.display(), "static directory not found, serving API only");
    }
    let app: Router = app
        .layer(CorsLayer::permissive())
        .with_state(AppState::new(store, universe));

    let addr = cli.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("perpscope listening on http://{addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    refresh_task.abort();
    if let Err(err) = refresh_task.await {
        if err.is_panic() {
            warn!(error = %err, "refresh loop panicked");
        }
    }
    served.map_err(StartupError::Serve)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received, stopping");
}
