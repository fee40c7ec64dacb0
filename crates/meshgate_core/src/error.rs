use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComputeError {
    /// The referenced image tag does not exist in the runtime.
    /// Maps to **HTTP 500** with an actionable "build it first" message.
    #[error("Image {0} does not exist, build it first")]
    ImageNotFound(String),

    /// The runtime reported a failed image build.
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error("Image build failed: {0}")]
    Build(String),

    /// The container could not be created or started.
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error("Container launch failed: {0}")]
    Launch(String),

    /// A bounded phase exceeded its configured deadline.
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Internal infrastructure failure (e.g., the Docker daemon is unreachable).
    /// Maps to **HTTP 500 Internal Server Error**.
    #[error("Compute system failure: {0}")]
    System(String),
}

/// Rejections raised before any container is started.
///
/// All variants map to **HTTP 400 Bad Request**.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The body could not be parsed as JSON.
    #[error("Malformed JSON body: {0}")]
    MalformedBody(String),

    /// The body was not a JSON object.
    #[error("Request body must be a JSON object")]
    NotAnObject,

    /// A present field carried a value of the wrong JSON type.
    #[error("Invalid field '{field}': expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// One or more required environment entries are unset or hold a placeholder.
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnvironment(Vec<String>),
}
