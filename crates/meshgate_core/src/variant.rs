//! Maps image tags to their resource bindings.
//!
//! The registry is built once at startup and shared read-only between requests.

use crate::constants::defaults;
use crate::job::{BindMode, GpuRequest, VolumeBinding};
use std::path::PathBuf;

/// A positional argument passed to the container entrypoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationArg {
    Literal(String),
    /// Substituted with the request's job id, empty if none was given.
    JobId,
}

impl InvocationArg {
    pub fn render(&self, job_id: Option<&str>) -> String {
        match self {
            Self::Literal(s) => s.clone(),
            Self::JobId => job_id.unwrap_or_default().to_string(),
        }
    }
}

/// The binding profile of a workload variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantProfile {
    pub volume_bindings: Vec<VolumeBinding>,
    pub device_requests: Option<GpuRequest>,
    pub invocation_args: Vec<InvocationArg>,
}

impl VariantProfile {
    /// No mounts, no devices, the job id as the only argument.
    pub fn cpu() -> Self {
        Self {
            volume_bindings: Vec::new(),
            device_requests: None,
            invocation_args: vec![InvocationArg::JobId],
        }
    }

    /// All GPUs, input mounted read-only and output read-write below `host_workdir`.
    pub fn gpu(host_workdir: impl Into<PathBuf>) -> Self {
        let workdir = host_workdir.into();
        Self {
            volume_bindings: vec![
                VolumeBinding {
                    host_path: workdir.join("input"),
                    container_path: defaults::CONTAINER_INPUT.to_string(),
                    mode: BindMode::ReadOnly,
                },
                VolumeBinding {
                    host_path: workdir.join("output"),
                    container_path: defaults::CONTAINER_OUTPUT.to_string(),
                    mode: BindMode::ReadWrite,
                },
            ],
            device_requests: Some(GpuRequest::all_devices()),
            invocation_args: vec![
                InvocationArg::Literal(defaults::CONTAINER_INPUT.to_string()),
                InvocationArg::Literal(defaults::CONTAINER_OUTPUT.to_string()),
            ],
        }
    }

    pub fn is_accelerated(&self) -> bool {
        self.device_requests.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct VariantRegistry {
    default_tag: String,
    accelerated_tag: String,
    accelerated: VariantProfile,
    fallback: VariantProfile,
}

impl Default for VariantRegistry {
    fn default() -> Self {
        Self::new(defaults::CPU_TAG, defaults::GPU_TAG, ".")
    }
}

impl VariantRegistry {
    pub fn new(
        default_tag: impl Into<String>,
        accelerated_tag: impl Into<String>,
        host_workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            default_tag: default_tag.into(),
            accelerated_tag: accelerated_tag.into(),
            accelerated: VariantProfile::gpu(host_workdir),
            fallback: VariantProfile::cpu(),
        }
    }

    /// The tag used when a request names none.
    pub fn default_tag(&self) -> &str {
        &self.default_tag
    }

    /// Never fails, unknown tags get the CPU profile.
    pub fn resolve(&self, tag: &str) -> &VariantProfile {
        if tag == self.accelerated_tag {
            &self.accelerated
        } else {
            &self.fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accelerated_tag_gets_all_gpus_and_both_mounts() {
        let registry = VariantRegistry::new("cpu", "gpu", "/srv/work");
        let profile = registry.resolve("gpu");

        assert_eq!(profile.device_requests, Some(GpuRequest::all_devices()));
        let binds: Vec<_> = profile
            .volume_bindings
            .iter()
            .map(VolumeBinding::to_bind_spec)
            .collect();
        assert_eq!(
            binds,
            vec![
                "/srv/work/input:/app/input:ro".to_string(),
                "/srv/work/output:/app/output:rw".to_string(),
            ]
        );
    }

    #[test]
    fn unknown_tags_degrade_to_cpu_profile() {
        let registry = VariantRegistry::default();

        for tag in [defaults::CPU_TAG, "x", "", "photogrammetry-gpu:latest"] {
            let profile = registry.resolve(tag);
            assert!(!profile.is_accelerated(), "{tag} should not be accelerated");
            assert!(profile.volume_bindings.is_empty());
            assert_eq!(profile.invocation_args, vec![InvocationArg::JobId]);
        }
    }

    #[test]
    fn job_id_argument_passes_through_empty() {
        assert_eq!(InvocationArg::JobId.render(Some("scan-42")), "scan-42");
        assert_eq!(InvocationArg::JobId.render(None), "");
    }
}
