//! Operator-supplied business logic and its calling contract.
//!
//! Two shapes exist, both optional:
//!
//! - [`PreAction`] shapes the form before it is shown (runs on the request).
//! - [`PostAction`] executes a submitted job (runs on the worker).
//!
//! Both receive the [`Clients`] pair so that administrative calls go through
//! the bot identity and user-scoped calls through the submitting user.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::warn;

use formwork_core::{Form, ValueMap};

use crate::upstream::{Clients, UpstreamError};

/// Boxed future returned by actions.
pub type ActionFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Executes one job: `(values, clients) -> outcome`.
pub type PostAction = Arc<dyn Fn(ValueMap, Clients) -> ActionFuture<ActionOutcome> + Send + Sync>;

/// Prepares the form for display: `(form, clients) -> form'`.
pub type PreAction =
    Arc<dyn Fn(Form, Clients) -> ActionFuture<Result<Form, ActionError>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("{0}")]
    Failed(String),
    #[error("action panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// What a [`PostAction`] reports back.
///
/// Messages produced before a failure are kept alongside the error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub messages: Vec<String>,
    pub error: Option<ActionError>,
}

impl ActionOutcome {
    pub fn ok(messages: Vec<String>) -> Self {
        Self {
            messages,
            error: None,
        }
    }

    pub fn failed(messages: Vec<String>, error: impl Into<ActionError>) -> Self {
        Self {
            messages,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Wrap an async closure as a [`PostAction`].
pub fn post_action<F, Fut>(f: F) -> PostAction
where
    F: Fn(ValueMap, Clients) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionOutcome> + Send + 'static,
{
    Arc::new(move |values: ValueMap, clients: Clients| -> ActionFuture<ActionOutcome> {
        Box::pin(f(values, clients))
    })
}

/// Wrap an async closure as a [`PreAction`].
pub fn pre_action<F, Fut>(f: F) -> PreAction
where
    F: Fn(Form, Clients) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Form, ActionError>> + Send + 'static,
{
    Arc::new(
        move |form: Form, clients: Clients| -> ActionFuture<Result<Form, ActionError>> {
            Box::pin(f(form, clients))
        },
    )
}

/// Run the pre-action, if any, on a copy of `form`.
///
/// Errors are logged and the unmodified form is returned, so a broken
/// pre-action never blocks rendering.
pub async fn preprocess_form(form: &Form, pre: Option<&PreAction>, clients: Clients) -> Form {
    let Some(pre) = pre else {
        return form.clone();
    };
    match pre(form.clone(), clients).await {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!(form = %form.name, error = %e, "pre-action failed, showing unmodified form");
            form.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use formwork_core::{Element, ElementType, Page};

    use super::*;
    use crate::upstream::UpstreamClient;

    fn clients() -> Clients {
        Clients::for_user_token(&UpstreamClient::new("http://vcs", "bot"), "user")
    }

    fn form() -> Form {
        Form::new(
            "Project creation",
            vec![Page {
                description: String::new(),
                elements: vec![Element::new("organisation", "Org").with_type(ElementType::Select)],
            }],
        )
    }

    #[tokio::test]
    async fn pre_action_shapes_the_form() {
        let pre = pre_action(|mut form: Form, clients: Clients| async move {
            for e in form.elements_mut() {
                e.value_list = vec![clients.user.token().unwrap_or_default().to_string()];
            }
            Ok(form)
        });
        let shown = preprocess_form(&form(), Some(&pre), clients()).await;
        assert_eq!(shown.pages[0].elements[0].value_list, vec!["user"]);
    }

    #[tokio::test]
    async fn failing_pre_action_keeps_original_form() {
        let pre = pre_action(|_form: Form, _clients: Clients| async move {
            Err(ActionError::from(UpstreamError::Unauthorized))
        });
        let original = form();
        let shown = preprocess_form(&original, Some(&pre), clients()).await;
        assert_eq!(shown, original);
    }

    #[tokio::test]
    async fn missing_pre_action_is_identity() {
        let original = form();
        assert_eq!(preprocess_form(&original, None, clients()).await, original);
    }

    #[test]
    fn outcome_keeps_messages_on_failure() {
        let outcome = ActionOutcome::failed(vec!["step 1".into()], ActionError::failed("step 2"));
        assert!(!outcome.is_ok());
        assert_eq!(outcome.messages, vec!["step 1"]);
        assert_eq!(outcome.error.unwrap().to_string(), "step 2");
    }
}
