//! HTTP application wiring (axum router + shared services).
//!
//! - `services.rs`: the state shared by all handlers
//! - `routes/`: handlers, one file per area
//! - `pages.rs`: HTML rendering
//! - `errors.rs`: consistent error pages

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware;

pub mod errors;
pub mod pages;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router.
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Protected routes: require a valid session.
    let protected = routes::router().route_layer(axum::middleware::from_fn_with_state(
        services.clone(),
        middleware::session_middleware,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .nest_service("/assets", ServeDir::new(&services.assets_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(services)),
        )
}
