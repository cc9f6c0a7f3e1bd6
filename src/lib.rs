// Library exports for Kudos
// This allows integration tests and the binary to share one router

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod rewards;
pub mod routes;
pub mod seed;
pub mod state;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full HTTP application.
pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
