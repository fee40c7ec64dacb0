use crate::pipeline::Pipeline;
use crate::services::GatewayServices;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState<S: GatewayServices> {
    pub services: S,
    /// Immutable, shared by every request.
    pub pipeline: Arc<Pipeline>,
}

impl<S> GatewayServices for AppState<S>
where
    S: GatewayServices,
{
    type Runtime = S::Runtime;
    type Env = S::Env;

    fn runtime(&self) -> &Self::Runtime {
        self.services.runtime()
    }

    fn env(&self) -> &Self::Env {
        self.services.env()
    }
}
