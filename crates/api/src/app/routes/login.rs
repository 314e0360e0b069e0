//! Sign-in and sign-out.
//!
//! Signing in exchanges the user's upstream password for an access token
//! once; afterwards only the token, kept in the session record, is used.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use formwork_auth::{Session, session_cookie};
use formwork_core::UserId;
use formwork_infra::store::StoreError;
use formwork_infra::upstream::{UpstreamClient, UpstreamError, login_exchange};

use crate::app::errors::{fail_page, html_page, store_error_to_response};
use crate::app::services::AppServices;
use crate::middleware::{session_id, sign_out};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub async fn show(Extension(services): Extension<Arc<AppServices>>) -> Result<Response, Response> {
    html_page(&services.pages, services.pages.login(None))
}

#[instrument(skip(services, req), fields(username = %req.username))]
pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    axum::Form(req): axum::Form<LoginRequest>,
) -> Result<Response, Response> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(rejected(&services, "Username and password are required"));
    }

    let server = UpstreamClient::anonymous(services.bot.base_url());
    let token = login_exchange(&server, username, &req.password, &services.token_name)
        .await
        .map_err(|e| upstream_failure(&services, e))?;

    let user = services
        .bot
        .with_token(&token)
        .current_user()
        .await
        .map_err(|e| upstream_failure(&services, e))?;

    let session = Session::new(UserId::new(user.id), token);
    services
        .store
        .insert_session(&session)
        .await
        .map_err(|e| store_error_to_response(&services.pages, e))?;

    info!(user_id = %session.user_id, "user signed in");
    let cookie = session_cookie(&services.policy, &session.id, Utc::now());
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> Response {
    if let Some(id) = session_id(&headers, &services.policy.cookie_name) {
        match services.store.delete_session(&id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => error!(error = %e, "failed to delete session on logout"),
        }
    }
    sign_out(&services)
}

fn rejected(services: &AppServices, message: &str) -> Response {
    match services.pages.login(Some(message)) {
        Ok(html) => (StatusCode::UNAUTHORIZED, Html(html)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render login page");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

fn upstream_failure(services: &AppServices, err: UpstreamError) -> Response {
    match err {
        UpstreamError::Unauthorized | UpstreamError::Status { status: 401 | 403, .. } => {
            warn!("upstream rejected sign-in");
            rejected(services, "Invalid username or password")
        }
        other => {
            error!(error = %other, "sign-in failed");
            fail_page(
                &services.pages,
                StatusCode::BAD_GATEWAY,
                "The version control server could not be reached",
            )
        }
    }
}
