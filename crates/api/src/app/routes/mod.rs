use axum::{Router, routing::get};

pub mod form;
pub mod log;
pub mod login;
pub mod system;

/// Routes reachable without a session.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/login", get(login::show).post(login::submit))
        .route("/logout", get(login::logout))
}

/// Routes that need a signed-in user.
pub fn router() -> Router {
    Router::new()
        .route("/", get(form::show).post(form::submit))
        .route("/log", get(log::list))
        .route("/log/:id", get(log::detail))
}
