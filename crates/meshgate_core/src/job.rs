use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::defaults;

/// A validated request to run a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    /// Build the image before running it.
    pub build_requested: bool,
    /// Image tag to build and run. Also selects the [`VariantProfile`](crate::variant::VariantProfile).
    pub image_tag: String,
    /// Job identifier forwarded to variants that take it as a positional argument.
    pub job_id: Option<String>,
}

impl Default for JobRequest {
    fn default() -> Self {
        Self {
            build_requested: false,
            image_tag: defaults::CPU_TAG.to_string(),
            job_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindMode {
    ReadOnly,
    ReadWrite,
}

impl BindMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }
}

/// A host directory mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub host_path: PathBuf,
    pub container_path: String,
    pub mode: BindMode,
}

impl VolumeBinding {
    /// Formats the binding as `host:container:mode`.
    pub fn to_bind_spec(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            self.mode.as_str()
        )
    }
}

/// GPU devices requested for a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuRequest {
    /// Device driver, [`None`] lets the runtime pick.
    pub driver: Option<String>,
    /// Number of devices, `-1` means all available.
    pub count: i64,
    pub capabilities: Vec<String>,
}

impl GpuRequest {
    pub fn all_devices() -> Self {
        Self {
            driver: None,
            count: -1,
            capabilities: vec!["gpu".to_string()],
        }
    }
}

/// Everything the runtime needs to launch one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub tag: String,
    pub args: Vec<String>,
    /// Ordered `(name, value)` pairs.
    pub env: Vec<(String, String)>,
    pub bindings: Vec<VolumeBinding>,
    pub device_requests: Option<GpuRequest>,
    /// Always `true`, the container is removed as soon as it exits.
    pub auto_remove: bool,
}

impl RunPlan {
    /// Environment in `NAME=value` form.
    pub fn env_list(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// An image build against a context directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub context_dir: PathBuf,
    pub build_file: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuildOutput {
    pub tag: String,
    /// Progress lines reported by the runtime, in order.
    pub log: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    Stdout,
    Stderr,
    Console,
}

/// One event of a running container.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A chunk of combined output, forwarded verbatim.
    Output { source: LogSource, chunk: Bytes },
    /// The container exited. Always the last event of a healthy run.
    Exited(i64),
}

impl RunEvent {
    pub fn stdout(chunk: impl Into<Bytes>) -> Self {
        Self::Output {
            source: LogSource::Stdout,
            chunk: chunk.into(),
        }
    }
}
