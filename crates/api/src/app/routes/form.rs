use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{error, info};

use formwork_core::ValueMap;
use formwork_infra::jobs::{Job, preprocess_form};

use crate::app::errors::{fail_page, html_page};
use crate::app::services::AppServices;
use crate::context::SessionContext;

/// The form, shaped by the pre-action for this user.
pub async fn show(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Response, Response> {
    let form = preprocess_form(
        &services.form,
        services.pre_action.as_ref(),
        ctx.clients().clone(),
    )
    .await;
    html_page(&services.pages, services.pages.form(&form))
}

/// Queue a job for the submitted values and send the user to their log.
///
/// Only fields the form defines are kept.
pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<SessionContext>,
    axum::Form(pairs): axum::Form<Vec<(String, String)>>,
) -> Result<Response, Response> {
    let fields = services.form.field_names();
    let values = ValueMap::from_pairs(
        pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        &fields,
    );
    let job = Job::from_submission(&services.form.name, ctx.user_id(), values);

    match services.queue.enqueue(job, ctx.clients().user.clone()).await {
        Ok(job) => {
            info!(job_id = %job.id, user_id = %job.user_id, label = %job.label, "job submitted");
            Ok(Redirect::to("/log").into_response())
        }
        Err(e) => {
            error!(user_id = %ctx.user_id(), error = %e, "failed to enqueue job");
            Err(fail_page(
                &services.pages,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Your request could not be queued, please try again later",
            ))
        }
    }
}
