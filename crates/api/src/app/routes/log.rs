use std::cmp::Reverse;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
};
use tracing::warn;

use formwork_auth::authorize_job_access;
use formwork_core::JobId;
use formwork_infra::store::StoreError;

use crate::app::errors::{fail_page, html_page, store_error_to_response};
use crate::app::services::AppServices;
use crate::context::SessionContext;

/// The user's jobs, newest first.
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Response, Response> {
    let mut jobs = services
        .store
        .list_jobs_for_user(ctx.user_id())
        .await
        .map_err(|e| store_error_to_response(&services.pages, e))?;
    jobs.sort_by_key(|j| Reverse((j.submit_time, j.id)));
    html_page(&services.pages, services.pages.log(&jobs))
}

/// One job of the user's. Jobs of other users look exactly like missing ones.
pub async fn detail(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<i64>,
) -> Result<Response, Response> {
    let not_found = || fail_page(&services.pages, StatusCode::NOT_FOUND, "No such request");

    let job = match services.store.get_job(JobId::new(id)).await {
        Ok(job) => job,
        Err(StoreError::NotFound(_)) => return Err(not_found()),
        Err(e) => return Err(store_error_to_response(&services.pages, e)),
    };
    if let Err(e) = authorize_job_access(ctx.user_id(), job.user_id) {
        warn!(job_id = %job.id, user_id = %ctx.user_id(), error = %e, "job access denied");
        return Err(not_found());
    }

    let form = services.form.with_values(&job.values);
    html_page(&services.pages, services.pages.job(&form, &job))
}
