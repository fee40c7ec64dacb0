use crate::pipeline::{PipelineError, TEXT_PLAIN};
use crate::prelude::*;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use meshgate_core::prelude::*;
use serde_json::{Value, json};

use tracing::error;

pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn plain(status: StatusCode, message: String) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], message).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self.0.downcast::<PipelineError>() {
            Ok(err) => return outcome_response(err.into_outcome()),
            Err(err) => err,
        };

        if let Some(err) = err.downcast_ref::<ValidationError>() {
            return plain(StatusCode::BAD_REQUEST, err.to_string());
        }

        error!("Internal Server Error: {:?}", err);
        plain(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    }
}

/// Response for an outcome reached before any output was sent.
fn outcome_response(outcome: ExecutionOutcome) -> Response {
    let status = match &outcome {
        ExecutionOutcome::Succeeded(_) => StatusCode::OK,
        ExecutionOutcome::ValidationError(_) => StatusCode::BAD_REQUEST,
        other => {
            error!("Job failed before streaming: {}", other.message());
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    plain(status, outcome.message())
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Meshgate server running",
    }))
}

/// POST /process
///
/// Streams the container's output as `text/plain`, followed by a status trailer.
pub async fn process<S: GatewayServices>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ValidationError::MalformedBody(e.to_string()))?
    };

    let res = state
        .pipeline
        .process(state.runtime(), state.env(), &body)
        .await?;

    Ok(res)
}
