use crate::error::*;
use crate::job::*;

use futures::stream::BoxStream;

/// Live events of a launched container.
pub type RunEvents = BoxStream<'static, Result<RunEvent, ComputeError>>;

/// A container that has been started.
pub struct RunHandle {
    /// Runtime-specific container name or id.
    pub id: String,
    /// Output chunks in production order, terminated by [`RunEvent::Exited`] or an error.
    pub events: RunEvents,
}

/// A trait for injecting container runtime logic into the pipeline.
pub trait ContainerRuntime: Send + Sync + 'static + Clone {
    /// Checks that the runtime is reachable.
    fn init(&self) -> impl Future<Output = Result<(), ComputeError>> + Send {
        async { Ok(()) }
    }

    /// Builds an image and resolves once the runtime reports completion or failure.
    fn build(
        &self,
        req: BuildRequest,
    ) -> impl Future<Output = Result<BuildOutput, ComputeError>> + Send;

    /// Creates and starts a container.
    ///
    /// Resolves as soon as the container is running; its output follows on [`RunHandle::events`].
    fn run(&self, plan: RunPlan) -> impl Future<Output = Result<RunHandle, ComputeError>> + Send;
}

/// A trait for injecting the source of runtime secrets.
pub trait EnvironmentProvider: Send + Sync + 'static + Clone {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads secrets from the process environment at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvironmentProvider for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed key-value pairs, e.g. secrets resolved once by a vault client.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv(pub Vec<(String, String)>);

impl StaticEnv {
    pub fn new<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl EnvironmentProvider for StaticEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}
