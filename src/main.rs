//! # Meshgate
//!
//! Runs the gateway against the local Docker daemon.
//!
//! ```sh
//! cargo run --features "server docker"
//! ```

use meshgate::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env()?;
    info!(mode = ?config.mode, port = config.port, "Loaded configuration");

    let runtime = DockerRuntime::connect_local()?;
    runtime.init().await?;

    let port = config.port;
    let services = CoreServices {
        runtime,
        env: ProcessEnv,
    };
    let app = MeshgateServer::new(config).build(services);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
