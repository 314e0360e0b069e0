//! Shared state handed to every handler.

use std::path::PathBuf;

use formwork_auth::SessionPolicy;
use formwork_core::Form;
use formwork_infra::jobs::{JobQueue, PreAction};
use formwork_infra::store::SharedStore;
use formwork_infra::upstream::UpstreamClient;

use super::pages::Pages;

/// Everything the web layer needs, built once by the service at start.
pub struct AppServices {
    /// The form users fill in; the pre-action works on a copy per request.
    pub form: Form,
    pub pre_action: Option<PreAction>,
    pub store: SharedStore,
    pub queue: JobQueue,
    /// Bot identity; user clients are derived from it with the session token.
    pub bot: UpstreamClient,
    pub policy: SessionPolicy,
    /// Name given to access tokens created at login.
    pub token_name: String,
    pub pages: Pages,
    pub assets_dir: PathBuf,
}
