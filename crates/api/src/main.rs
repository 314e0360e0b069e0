use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use formwork_api::Service;
use formwork_api::service::wait_for_interrupt;
use formwork_core::{Element, ElementType, Form, Page, ValueMap};
use formwork_infra::config::ServiceConfig;
use formwork_infra::jobs::{ActionError, ActionOutcome, post_action, pre_action};
use formwork_infra::upstream::Clients;
use formwork_observability::LogFormat;

const DEFAULT_CONFIG: &str = "formwork.json";

/// Serve a web form whose submissions run as queued jobs against a hosted
/// version-control server.
#[derive(Debug, Parser)]
#[command(name = "formwork", version)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log output format (json or pretty); overrides the configuration.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The default file is optional; an explicitly named one is not.
    let path = (cli.config.exists() || cli.config.as_os_str() != DEFAULT_CONFIG)
        .then_some(cli.config.as_path());
    let config = ServiceConfig::load(path).context("loading configuration")?;

    formwork_observability::init(cli.log_format.unwrap_or(config.log_format));

    let pre = pre_action(fill_in_name);
    let post = post_action(echo);
    let mut service = Service::new(echo_form(), Some(pre), Some(post), config);
    let addr = service.start().await.context("starting service")?;
    tracing::info!(%addr, "ready");

    wait_for_interrupt().await;
    service.stop().await;
    Ok(())
}

fn echo_form() -> Form {
    let mut form = Form::new(
        "Echo",
        vec![Page {
            description: "Everything entered here is echoed back by the job.".into(),
            elements: vec![
                Element::new("name", "Name").required(),
                Element::new("description", "Description")
                    .with_type(ElementType::TextArea)
                    .with_description("Enter \"error\" to make the job fail."),
                Element::new("duration", "Duration")
                    .with_type(ElementType::Number)
                    .with_description("Seconds the job takes."),
            ],
        }],
    );
    form.description = "A demonstration form.".into();
    form
}

/// Pre-fill the name with the signed-in user's full name.
async fn fill_in_name(mut form: Form, clients: Clients) -> Result<Form, ActionError> {
    let user = clients.user.current_user().await?;
    let name = if user.full_name.is_empty() {
        user.username
    } else {
        user.full_name
    };
    if let Some(element) = form.elements_mut().find(|e| e.name == "name") {
        element.value = name;
    }
    Ok(form)
}

/// Echo every field as `"<key>: <values>"`, then wait `duration` seconds.
async fn echo(values: ValueMap, _clients: Clients) -> ActionOutcome {
    let messages: Vec<String> = values
        .iter()
        .map(|(key, vals)| format!("{key}: {}", vals.join(", ")))
        .collect();

    if values.iter().any(|(_, vals)| vals.iter().any(|v| v == "error")) {
        return ActionOutcome::failed(messages, ActionError::failed("asked to fail"));
    }

    let seconds = values
        .first("duration")
        .and_then(|d| d.trim().parse::<u64>().ok())
        .unwrap_or(0);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    ActionOutcome::ok(messages)
}
