use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use tracing::{info, warn};

use formwork_auth::{expired_cookie, session_id_from_cookie_header, validate_session};
use formwork_core::SessionId;
use formwork_infra::store::StoreError;
use formwork_infra::upstream::Clients;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::SessionContext;

/// Resolve the session cookie to a [`SessionContext`], or send the browser
/// to the login page.
pub async fn session_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(session_id) = session_id(req.headers(), &services.policy.cookie_name) else {
        return Redirect::to("/login").into_response();
    };

    let session = match services.store.get_session(&session_id).await {
        Ok(session) => session,
        Err(StoreError::NotFound(_)) => return sign_out(&services),
        Err(e) => return errors::store_error_to_response(&services.pages, e),
    };

    if let Err(e) = validate_session(&session, &services.policy, Utc::now()) {
        info!(user_id = %session.user_id, error = %e, "session rejected");
        if let Err(e) = services.store.delete_session(&session.id).await {
            warn!(user_id = %session.user_id, error = %e, "failed to delete rejected session");
        }
        return sign_out(&services);
    }

    let clients = Clients::for_user_token(&services.bot, &session.token);
    req.extensions_mut()
        .insert(SessionContext::new(session, clients));

    next.run(req).await
}

/// Session id from the request's `Cookie` header, if any.
pub fn session_id(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|h| session_id_from_cookie_header(h, cookie_name))
}

/// Drop the cookie and redirect to the login page.
pub fn sign_out(services: &AppServices) -> Response {
    (
        [(header::SET_COOKIE, expired_cookie(&services.policy))],
        Redirect::to("/login"),
    )
        .into_response()
}
