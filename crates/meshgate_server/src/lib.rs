//! # Meshgate Server
//!
//! An Axum-based gateway that builds container images on demand, runs jobs and streams their
//! output back to the caller.
//!
//! Provides the [`MeshgateServer`] builder, which ties together a [`ContainerRuntime`] and an
//! [`EnvironmentProvider`] to serve jobs.
//!
//! ## Routes
//!
//! * **`GET /health`**: liveness check, never touches the runtime.
//! * **`POST /process`**: `{ shouldBuild?, imageName?, photogrammetryId? }`. Responds with the live
//!   `text/plain` output of the container, terminated by a status trailer.
//!
//! ## Example
//!
//! ```no_run
//! use meshgate_server::prelude::*;
//! use meshgate_core::prelude::{ContainerRuntime, ProcessEnv};
//!
//! # async fn run(runtime: impl ContainerRuntime) -> anyhow::Result<()> {
//! let config = ServerConfig::from_env()?;
//! let services = CoreServices { runtime, env: ProcessEnv };
//!
//! let app = MeshgateServer::new(config).build(services);
//! # Ok(())
//! # }
//! ```
//!
//! [`ContainerRuntime`]: meshgate_core::traits::ContainerRuntime
//! [`EnvironmentProvider`]: meshgate_core::traits::EnvironmentProvider

mod api;

pub mod config;
pub mod pipeline;
pub mod server;
pub mod services;
pub mod state;

pub mod prelude {
    pub use crate::config::*;
    pub use crate::pipeline::Pipeline;
    pub use crate::server::MeshgateServer;
    pub use crate::services::*;
    pub use crate::state::*;
}
