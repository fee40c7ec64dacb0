//! # Meshgate
//!
//! A gateway that builds photogrammetry container images on demand, runs jobs in them and streams
//! the container output back over HTTP.
//!
//! This crate serves as an entry point, re-exporting the core logic and
//! optionally including the server and the Docker runtime via feature flags.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **`server`** | Includes the Axum-based gateway (`meshgate_server`). |
//! | **`docker`** | Container runtime backed by the local Docker daemon (`meshgate_docker`). |
//!
//! ## Example: Custom Server
//!
//! ```toml
//! [dependencies]
//! meshgate = { version = "0.3", features = ["server", "docker"] }
//! ```
//!
//! ```rust,no_run
//! use meshgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let runtime = DockerRuntime::connect_local()?;
//!
//!     // Build
//!     let port = config.port;
//!     let app = MeshgateServer::new(config).build(CoreServices { runtime, env: ProcessEnv });
//!
//!     // Serve
//!     let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub use meshgate_core::*;

#[cfg(feature = "server")]
pub mod server {
    pub use meshgate_server::*;
}

#[cfg(feature = "docker")]
pub mod docker {
    pub use meshgate_docker::*;
}

pub mod prelude {
    pub use meshgate_core::prelude::*;

    #[cfg(feature = "server")]
    pub use meshgate_server::prelude::*;

    #[cfg(feature = "docker")]
    pub use meshgate_docker::DockerRuntime;
}
