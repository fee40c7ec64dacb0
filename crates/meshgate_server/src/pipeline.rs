//! Build-and-run orchestration of a single request.
//!
//! A request moves through `Building -> Launching -> Streaming -> Finalizing`. Failures before
//! the first runtime event are returned as errors and become a status code. Once the first output
//! chunk is forwarded the status is committed, so later failures can only be appended to the body.

use crate::config::PipelineConfig;
use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use meshgate_core::prelude::*;
use serde_json::Value;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

/// Chunks buffered between the relay task and the response body.
const CHANNEL_CAPACITY: usize = 64;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// A failure detected before anything was streamed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Runtime(#[from] ComputeError),
    /// The output stream failed before its first chunk.
    #[error("{0}")]
    Stream(String),
}

impl PipelineError {
    pub fn into_outcome(self) -> ExecutionOutcome {
        match self {
            Self::Validation(e) => ExecutionOutcome::ValidationError(e),
            Self::Runtime(e) => ExecutionOutcome::RuntimeError(e),
            Self::Stream(cause) => ExecutionOutcome::StreamError(cause),
        }
    }
}

/// Shared, read-only pipeline stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: VariantRegistry,
    builder: BuildOrchestrator,
    json_summary: bool,
    job_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            registry: VariantRegistry::new(
                config.default_tag.as_str(),
                config.gpu_tag.as_str(),
                config.host_workdir.clone(),
            ),
            builder: BuildOrchestrator::new(config.build_context.clone(), config.build_file.as_str())
                .with_timeout(config.job_timeout),
            json_summary: config.json_summary,
            job_timeout: config.job_timeout,
        }
    }

    /// Runs one request to completion or to the start of its output stream.
    pub async fn process<R, E>(
        &self,
        runtime: &R,
        env: &E,
        body: &Value,
    ) -> Result<Response, PipelineError>
    where
        R: ContainerRuntime,
        E: EnvironmentProvider,
    {
        let request = parse_request(body, self.registry.default_tag())?;
        let profile = self.registry.resolve(&request.image_tag);
        let plan = plan(&request, profile, RunEnvironment::snapshot(env))?;

        info!(
            tag = %request.image_tag,
            job_id = request.job_id.as_deref().unwrap_or_default(),
            build = request.build_requested,
            gpu = profile.is_accelerated(),
            "Accepted job"
        );

        self.builder
            .build_if_needed(runtime, &request.image_tag, request.build_requested)
            .await?;

        let handle = runtime.run(plan).await.inspect_err(|e| {
            error!(tag = %request.image_tag, error = %e, "Failed to launch container");
        })?;

        info!(container = %handle.id, "Streaming container output");
        self.stream(handle, request.image_tag).await
    }

    /// Commits the response on the first event, then relays the rest from a separate task.
    async fn stream(&self, handle: RunHandle, tag: String) -> Result<Response, PipelineError> {
        let mut events = handle.events;
        let deadline = self.job_timeout.map(|t| Instant::now() + t);
        let timeout_secs = self.job_timeout.map(|t| t.as_secs()).unwrap_or_default();

        let first = match next_event(&mut events, deadline, timeout_secs).await {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(PipelineError::Stream(e.to_string())),
            None => return Err(PipelineError::Stream(CLOSED_EARLY.to_string())),
        };

        let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let relay = Relay {
            tx: Some(tx),
            latch: OutcomeLatch::new(),
            tag,
            json_summary: self.json_summary,
        };

        tokio::spawn(async move {
            relay
                .run(first, events, deadline, timeout_secs)
                .await;
        });

        let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
        Ok((StatusCode::OK, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response())
    }
}

const CLOSED_EARLY: &str = "Output stream closed before the container exited";

async fn next_event(
    events: &mut RunEvents,
    deadline: Option<Instant>,
    timeout_secs: u64,
) -> Option<Result<RunEvent, ComputeError>> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, events.next())
            .await
            .unwrap_or(Some(Err(ComputeError::Timeout(timeout_secs)))),
        None => events.next().await,
    }
}

/// Owns the sending half of one response.
///
/// The sender is dropped as soon as the outcome is recorded, which ends the body. The event stream
/// is still drained so that every later terminal signal reaches the latch.
struct Relay {
    tx: Option<mpsc::Sender<Bytes>>,
    latch: OutcomeLatch,
    tag: String,
    json_summary: bool,
}

impl Relay {
    async fn run(
        mut self,
        first: RunEvent,
        mut events: RunEvents,
        deadline: Option<Instant>,
        timeout_secs: u64,
    ) {
        let mut next: Option<Result<RunEvent, ComputeError>> = Some(Ok(first));

        loop {
            match next {
                Some(Ok(RunEvent::Output { source, chunk })) => self.forward(source, chunk).await,
                Some(Ok(RunEvent::Exited(code))) => {
                    self.finalize(ExecutionOutcome::Succeeded(code)).await
                }
                // An elapsed deadline stays elapsed, nothing more will arrive.
                Some(Err(e @ ComputeError::Timeout(_))) => {
                    self.finalize(ExecutionOutcome::StreamError(e.to_string()))
                        .await;
                    break;
                }
                Some(Err(e)) => {
                    self.finalize(ExecutionOutcome::StreamError(e.to_string()))
                        .await
                }
                None => {
                    self.finalize(ExecutionOutcome::StreamError(CLOSED_EARLY.to_string()))
                        .await;
                    break;
                }
            }

            next = next_event(&mut events, deadline, timeout_secs).await;
        }
    }

    async fn forward(&mut self, source: LogSource, chunk: Bytes) {
        if self.latch.is_resolved() {
            return;
        }

        debug!(
            target: "meshgate::output",
            ?source,
            "{}",
            String::from_utf8_lossy(&chunk).trim_end()
        );

        let sent = match &self.tx {
            Some(tx) => tx.send(chunk).await.is_ok(),
            None => false,
        };
        if !sent {
            self.finalize(ExecutionOutcome::StreamError(
                "Client disconnected".to_string(),
            ))
            .await;
        }
    }

    async fn finalize(&mut self, outcome: ExecutionOutcome) {
        let Some(outcome) = self.latch.resolve(outcome) else {
            debug!(tag = %self.tag, "Outcome already recorded, ignoring terminal signal");
            return;
        };

        match outcome {
            ExecutionOutcome::Succeeded(code) => {
                info!(tag = %self.tag, code, "Container exited")
            }
            other => warn!(tag = %self.tag, "{}", other.message()),
        }

        let Some(tx) = self.tx.take() else {
            return;
        };
        for part in render_trailer(outcome, &self.tag, self.json_summary) {
            if tx.send(part).await.is_err() {
                break;
            }
        }
    }
}

/// Closing text of a response, the JSON summary only follows a completed run.
fn render_trailer(outcome: &ExecutionOutcome, tag: &str, json_summary: bool) -> Vec<Bytes> {
    let mut parts = vec![Bytes::from(outcome.trailer())];

    if let (true, ExecutionOutcome::Succeeded(code)) = (json_summary, outcome) {
        match serde_json::to_string(&RunSummary::from_exit(*code, tag)) {
            Ok(json) => parts.push(Bytes::from(format!("{json}\n"))),
            Err(e) => error!("Serialization error: {:?}", e),
        }
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_follows_only_completed_runs() {
        let ok = render_trailer(&ExecutionOutcome::Succeeded(0), "cpu", true);
        assert_eq!(ok.len(), 2);
        assert_eq!(ok[0], Bytes::from("\nContainer exited with code 0\n"));
        assert!(ok[1].starts_with(b"{\"status\":\"success\""));

        let err = render_trailer(
            &ExecutionOutcome::StreamError("boom".into()),
            "cpu",
            true,
        );
        assert_eq!(err, vec![Bytes::from("\nStream error: boom\n")]);

        let quiet = render_trailer(&ExecutionOutcome::Succeeded(2), "cpu", false);
        assert_eq!(quiet.len(), 1);
    }

    #[test]
    fn early_failures_keep_their_kind() {
        let outcome = PipelineError::from(ComputeError::ImageNotFound("gpu".into())).into_outcome();
        assert_eq!(
            outcome,
            ExecutionOutcome::RuntimeError(ComputeError::ImageNotFound("gpu".into()))
        );

        let outcome = PipelineError::Stream("eof".into()).into_outcome();
        assert_eq!(outcome, ExecutionOutcome::StreamError("eof".into()));
    }
}
