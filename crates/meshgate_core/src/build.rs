use crate::error::ComputeError;
use crate::job::{BuildOutput, BuildRequest};
use crate::traits::ContainerRuntime;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// Builds images from a single fixed build context.
#[derive(Debug, Clone)]
pub struct BuildOrchestrator {
    context_dir: PathBuf,
    build_file: String,
    timeout: Option<Duration>,
}

impl BuildOrchestrator {
    pub fn new(context_dir: impl Into<PathBuf>, build_file: impl Into<String>) -> Self {
        Self {
            context_dir: context_dir.into(),
            build_file: build_file.into(),
            timeout: None,
        }
    }

    /// Bounds how long a build may take. Unbounded by default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds `tag` if `should_build` is set, otherwise returns immediately.
    ///
    /// Failures are not retried.
    pub async fn build_if_needed<R: ContainerRuntime>(
        &self,
        runtime: &R,
        tag: &str,
        should_build: bool,
    ) -> Result<Option<BuildOutput>, ComputeError> {
        if !should_build {
            return Ok(None);
        }

        info!(
            tag,
            context = %self.context_dir.display(),
            "Building image"
        );

        let req = BuildRequest {
            context_dir: self.context_dir.clone(),
            build_file: self.build_file.clone(),
            tag: tag.to_string(),
        };

        let res = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, runtime.build(req))
                .await
                .unwrap_or(Err(ComputeError::Timeout(limit.as_secs()))),
            None => runtime.build(req).await,
        };

        match res {
            Ok(output) => {
                info!(tag, steps = output.log.len(), "Image built");
                Ok(Some(output))
            }
            Err(e) => {
                error!(tag, error = %e, "Image build failed");
                Err(e)
            }
        }
    }
}
