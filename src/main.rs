use std::env;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use policy_assistant::core::config::{load_config, AppPaths};
use policy_assistant::core::logging;
use policy_assistant::server;
use policy_assistant::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let paths = AppPaths::from_config(&config);
    paths
        .ensure_dirs()
        .context("Failed to create data directories")?;
    logging::init(&config, &paths);

    let reindex = env::args().nth(1).as_deref() == Some("reindex");
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::initialize(config, &paths, reindex).await?;

    if reindex {
        println!("{}", serde_json::to_string_pretty(&state.index)?);
        state.shutdown().await;
        if !state.index.is_ready() {
            anyhow::bail!("Reindex failed");
        }
        return Ok(());
    }

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
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
                tracing::error!("Failed to listen for SIGTERM: {}", err);
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
    tracing::info!("Shutdown signal received.");
}
