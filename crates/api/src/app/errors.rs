use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use formwork_infra::store::StoreError;

use super::pages::{PageError, Pages};

/// Error page with `status`. Falls back to plain text if the page itself
/// cannot be rendered.
pub fn fail_page(pages: &Pages, status: StatusCode, message: impl AsRef<str>) -> Response {
    match pages.fail(status, message.as_ref()) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render error page");
            (status, message.as_ref().to_string()).into_response()
        }
    }
}

pub fn store_error_to_response(pages: &Pages, err: StoreError) -> Response {
    match err {
        StoreError::NotFound(_) => fail_page(pages, StatusCode::NOT_FOUND, "Not found"),
        StoreError::AlreadyExists(msg) | StoreError::Storage(msg) => {
            error!(error = %msg, "store failure while handling request");
            fail_page(pages, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Wrap a rendered page, or report the template failure as a 500.
pub fn html_page(pages: &Pages, rendered: Result<String, PageError>) -> Result<Response, Response> {
    match rendered {
        Ok(html) => Ok(Html(html).into_response()),
        Err(e) => {
            error!(error = %e, "failed to render page");
            Err(fail_page(pages, StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"))
        }
    }
}
