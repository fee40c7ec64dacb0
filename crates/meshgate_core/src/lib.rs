//! # Meshgate Core
//!
//! Types, traits and pipeline stages of the job gateway.
//!
//! - **[`VariantRegistry`](variant::VariantRegistry)**: maps an image tag to its GPU devices, mounts and arguments.
//! - **[`BuildOrchestrator`](build::BuildOrchestrator)**: builds an image on request before anything runs.
//! - **[`plan`](planner::plan)**: validates a request and its secrets into a [`RunPlan`](job::RunPlan).
//! - **[`ContainerRuntime`](traits::ContainerRuntime)**: trait for implementing container backends (e.g., Docker).
//! - **[`OutcomeLatch`](outcome::OutcomeLatch)**: guarantees one terminal outcome per request.

pub mod build;
pub mod constants;
pub mod error;
pub mod job;
pub mod outcome;
pub mod planner;
pub mod traits;
pub mod variant;

#[cfg(any(test, feature = "testkit"))]
pub mod testing;

pub mod prelude {
    pub use super::build::*;
    pub use super::constants::*;
    pub use super::error::*;
    pub use super::job::*;
    pub use super::outcome::*;
    pub use super::planner::*;
    pub use super::traits::*;
    pub use super::variant::*;
}
