use crate::{api, config::ServerConfig, pipeline::Pipeline, prelude::*};
use axum::{
    Router,
    routing::{get, post},
};
use meshgate_core::prelude::routes;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// The builder for the Meshgate Server.
#[derive(Clone, Debug, Default)]
pub struct MeshgateServer {
    config: ServerConfig,
}

impl MeshgateServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn build<S: GatewayServices>(self, services: S) -> Router {
        let cors = self.config.cors_layer();
        let pipeline = Arc::new(Pipeline::new(&self.config.pipeline));

        Router::new()
            .route(routes::HEALTH, get(api::health))
            .route(routes::PROCESS, post(api::process::<S>))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(AppState { services, pipeline })
    }
}
