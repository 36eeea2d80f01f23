// Library exports for retube
// This allows integration tests and external code to use retube modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod player;
pub mod routes;
pub mod state;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router. Shared by `main` and the integration
/// tests, which bind it to an ephemeral port.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::home::index))
        .route("/search", get(routes::home::search))
        .route("/assets/{*path}", get(routes::assets::serve))
        .merge(routes::users::router())
        .merge(routes::videos::router())
        .merge(routes::api::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
