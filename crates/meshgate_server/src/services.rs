use meshgate_core::prelude::*;

/// The collaborators a request handler needs.
pub trait GatewayServices: Send + Sync + 'static + Clone {
    type Runtime: ContainerRuntime;
    type Env: EnvironmentProvider;

    fn runtime(&self) -> &Self::Runtime;
    fn env(&self) -> &Self::Env;
}

#[derive(Clone)]
pub struct CoreServices<R, E> {
    pub runtime: R,
    pub env: E,
}

impl<R, E> GatewayServices for CoreServices<R, E>
where
    R: ContainerRuntime,
    E: EnvironmentProvider,
{
    type Runtime = R;
    type Env = E;

    fn runtime(&self) -> &R {
        &self.runtime
    }

    fn env(&self) -> &E {
        &self.env
    }
}
