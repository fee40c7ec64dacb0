use crate::error::{ComputeError, ValidationError};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// The single terminal result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The container ran to completion, whatever its exit code.
    Succeeded(i64),
    /// Build, launch or runtime failure.
    RuntimeError(ComputeError),
    /// Relaying output failed after the container was started.
    StreamError(String),
    ValidationError(ValidationError),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// One-line human-readable description.
    pub fn message(&self) -> String {
        match self {
            Self::Succeeded(code) => format!("Container exited with code {code}"),
            Self::RuntimeError(e) => format!("Error: {e}"),
            Self::StreamError(cause) => format!("Stream error: {cause}"),
            Self::ValidationError(e) => e.to_string(),
        }
    }

    /// Text appended after streamed output.
    pub fn trailer(&self) -> String {
        format!("\n{}\n", self.message())
    }
}

/// Structured summary appended after a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub status: String,
    pub message: String,
    pub image_name: String,
}

impl RunSummary {
    pub fn from_exit(code: i64, image_name: &str) -> Self {
        Self {
            status: if code == 0 { "success" } else { "failed" }.to_string(),
            message: ExecutionOutcome::Succeeded(code).message(),
            image_name: image_name.to_string(),
        }
    }
}

/// Records the first outcome of a request and ignores every later one.
///
/// Several terminal signals can describe the same failure, e.g. an output error followed by a
/// wait error once the container is gone. Only the first resolution finalizes the response.
#[derive(Debug, Default)]
pub struct OutcomeLatch {
    outcome: OnceLock<ExecutionOutcome>,
}

impl OutcomeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the outcome if this call resolved the latch, [`None`] if it was already resolved.
    pub fn resolve(&self, outcome: ExecutionOutcome) -> Option<&ExecutionOutcome> {
        self.outcome.set(outcome).ok()?;
        self.outcome.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.get().is_some()
    }
}
