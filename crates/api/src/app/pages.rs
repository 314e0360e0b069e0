//! HTML pages rendered with handlebars.
//!
//! Every page is rendered in two steps: the page body from its own template,
//! then the shared layout with the body inserted unescaped.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;

use formwork_core::{Element, ElementType, Form};
use formwork_infra::jobs::Job;

const TIME_FORMAT: &str = "%H:%M:%S %a %b %-d %Y";

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("template error: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("render error: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// The compiled page templates.
pub struct Pages {
    registry: Handlebars<'static>,
    server: String,
}

impl Pages {
    /// Compile the built-in templates. `server` is the upstream address shown
    /// on the login page.
    pub fn new(server: impl Into<String>) -> Result<Self, PageError> {
        let mut registry = Handlebars::new();
        registry.register_template_string("layout", include_str!("../../templates/layout.hbs"))?;
        registry.register_template_string("login", include_str!("../../templates/login.hbs"))?;
        registry.register_template_string("form", include_str!("../../templates/form.hbs"))?;
        registry.register_template_string("log", include_str!("../../templates/log.hbs"))?;
        registry.register_template_string("fail", include_str!("../../templates/fail.hbs"))?;
        Ok(Self {
            registry,
            server: server.into(),
        })
    }

    pub fn login(&self, error: Option<&str>) -> Result<String, PageError> {
        let body = self.registry.render(
            "login",
            &json!({ "server": self.server, "error": error }),
        )?;
        self.layout("Sign in", false, body)
    }

    /// The submission form as the user fills it in.
    pub fn form(&self, form: &Form) -> Result<String, PageError> {
        let body = self.registry.render("form", &FormView::new(form, None))?;
        self.layout(&form.name, true, body)
    }

    /// One job: the form filled with its values plus its outcome.
    pub fn job(&self, form: &Form, job: &Job) -> Result<String, PageError> {
        let body = self
            .registry
            .render("form", &FormView::new(form, Some(JobView::new(job))))?;
        self.layout(&format!("{} #{}", form.name, job.id), true, body)
    }

    /// Jobs in the order given.
    pub fn log(&self, jobs: &[Job]) -> Result<String, PageError> {
        let jobs: Vec<JobView> = jobs.iter().map(JobView::new).collect();
        let body = self.registry.render("log", &json!({ "jobs": jobs }))?;
        self.layout("My requests", true, body)
    }

    pub fn fail(&self, status: StatusCode, message: &str) -> Result<String, PageError> {
        let status = status.to_string();
        let body = self.registry.render(
            "fail",
            &json!({ "status": status, "message": message }),
        )?;
        self.layout(&status, false, body)
    }

    fn layout(&self, title: &str, signed_in: bool, content: String) -> Result<String, PageError> {
        Ok(self.registry.render(
            "layout",
            &json!({ "title": title, "signed_in": signed_in, "content": content }),
        )?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View models
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FormView<'a> {
    name: &'a str,
    description: &'a str,
    pages: Vec<PageView<'a>>,
    job: Option<JobView<'a>>,
}

impl<'a> FormView<'a> {
    fn new(form: &'a Form, job: Option<JobView<'a>>) -> Self {
        Self {
            name: &form.name,
            description: &form.description,
            pages: form
                .pages
                .iter()
                .map(|p| PageView {
                    description: &p.description,
                    elements: p.elements.iter().map(ElementView::new).collect(),
                })
                .collect(),
            job,
        }
    }
}

#[derive(Serialize)]
struct PageView<'a> {
    description: &'a str,
    elements: Vec<ElementView<'a>>,
}

#[derive(Serialize)]
struct ElementView<'a> {
    id: &'a str,
    name: &'a str,
    label: &'a str,
    description: &'a str,
    value: &'a str,
    input_type: &'static str,
    required: bool,
    read_only: bool,
    is_input: bool,
    is_textarea: bool,
    is_select: bool,
    is_choices: bool,
    options: Vec<OptionView<'a>>,
    datalist: Option<String>,
}

#[derive(Serialize)]
struct OptionView<'a> {
    id: String,
    value: &'a str,
    selected: bool,
}

impl<'a> ElementView<'a> {
    fn new(element: &'a Element) -> Self {
        let kind = element.element_type;
        let is_choices = kind.is_choice_group();
        let is_textarea = kind == ElementType::TextArea;
        let is_select = kind == ElementType::Select;
        let is_input = !(is_choices || is_textarea || is_select);

        // Read-only job views join multiple values with ", ".
        let chosen: Vec<&str> = element.value.split(", ").collect();
        let options = element
            .value_list
            .iter()
            .enumerate()
            .map(|(i, value)| OptionView {
                id: format!("{}-{i}", element.id),
                value,
                selected: chosen.contains(&value.as_str()),
            })
            .collect();

        Self {
            id: &element.id,
            name: &element.name,
            label: &element.label,
            description: &element.description,
            value: &element.value,
            input_type: kind.as_str(),
            required: element.required,
            read_only: element.read_only,
            is_input,
            is_textarea,
            is_select,
            is_choices,
            options,
            datalist: (is_input && !element.value_list.is_empty())
                .then(|| format!("{}-list", element.id)),
        }
    }
}

#[derive(Serialize)]
struct JobView<'a> {
    id: i64,
    label: &'a str,
    status: &'static str,
    status_class: &'static str,
    submitted: String,
    ended: Option<String>,
    messages: &'a [String],
    error: Option<&'a str>,
}

impl<'a> JobView<'a> {
    fn new(job: &'a Job) -> Self {
        let (status, status_class) = match (job.is_finished(), job.is_failed()) {
            (false, _) => ("In queue", "queued"),
            (true, false) => ("Finished", "finished"),
            (true, true) => ("Failed", "failed"),
        };
        Self {
            id: job.id.get(),
            label: &job.label,
            status,
            status_class,
            submitted: job.submit_time.map(format_time).unwrap_or_default(),
            ended: job.end_time.map(format_time),
            messages: &job.messages,
            error: job.error.as_deref(),
        }
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format(TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use formwork_core::{JobId, Page, UserId, ValueMap};

    use super::*;

    fn form() -> Form {
        let mut team = Element::new("team", "Team").with_type(ElementType::Radio);
        team.value_list = vec!["red".into(), "blue".into()];
        let mut org = Element::new("org", "Organisation").with_type(ElementType::Select);
        org.value_list = vec!["lab".into(), "<script>".into()];
        Form::new(
            "Project creation",
            vec![Page {
                description: "Details".into(),
                elements: vec![
                    Element::new("name", "Name").required(),
                    Element::new("notes", "Notes").with_type(ElementType::TextArea),
                    team,
                    org,
                ],
            }],
        )
    }

    #[test]
    fn form_page_renders_every_element_kind() {
        let html = Pages::new("https://vcs.example.org").unwrap().form(&form()).unwrap();
        assert!(html.contains("<title>Project creation</title>"));
        assert!(html.contains(r#"<input type="text" id="name" name="name" value="" required>"#));
        assert!(html.contains(r#"<textarea id="notes" name="notes">"#));
        assert!(html.contains(r#"<input type="radio" id="team-1" name="team" value="blue">"#));
        assert!(html.contains(r#"<option value="lab">"#));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains(r#"<button type="submit">"#));
        assert!(html.contains(r#"href="/logout""#));
    }

    #[test]
    fn job_page_shows_values_and_outcome() {
        let mut values = ValueMap::new();
        values.push("name", "atlas");
        values.push("team", "blue");
        let mut job = Job::new(UserId::new(1), "Project creation 0badc0de", values.clone());
        job.id = JobId::new(12);
        job.submit_time = Some(Utc::now());
        job.end_time = Some(Utc::now());
        job.messages = vec!["created repository".into()];
        job.error = Some("team already exists".into());

        let pages = Pages::new("vcs").unwrap();
        let html = pages.job(&form().with_values(&values), &job).unwrap();
        assert!(html.contains("#12 Project creation 0badc0de"));
        assert!(html.contains("Failed"));
        assert!(html.contains("<li>created repository</li>"));
        assert!(html.contains("team already exists"));
        assert!(html.contains(r#"value="atlas" required readonly>"#));
        assert!(html.contains(r#"value="blue" checked disabled>"#));
        assert!(!html.contains(r#"<button type="submit">"#));
    }

    #[test]
    fn log_lists_jobs_with_status() {
        let mut queued = Job::new(UserId::new(1), "first", ValueMap::new());
        queued.id = JobId::new(1);
        queued.submit_time = Some(Utc::now());
        let mut done = Job::new(UserId::new(1), "second", ValueMap::new());
        done.id = JobId::new(2);
        done.end_time = Some(Utc::now());

        let pages = Pages::new("vcs").unwrap();
        let html = pages.log(&[done, queued]).unwrap();
        assert!(html.contains(r#"<a href="/log/1">first</a>"#));
        assert!(html.contains("In queue"));
        assert!(html.contains("Finished"));
        assert!(html.find("second") < html.find("first"));

        let empty = pages.log(&[]).unwrap();
        assert!(empty.contains("not submitted anything"));
    }

    #[test]
    fn login_and_fail_pages() {
        let pages = Pages::new("https://vcs.example.org").unwrap();
        let html = pages.login(Some("Invalid username or password")).unwrap();
        assert!(html.contains("https://vcs.example.org"));
        assert!(html.contains("Invalid username or password"));
        assert!(!html.contains(r#"href="/logout""#));

        let html = pages.fail(StatusCode::NOT_FOUND, "no such request").unwrap();
        assert!(html.contains("404 Not Found"));
        assert!(html.contains("no such request"));
    }

    #[test]
    fn times_use_the_display_format() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T14:07:09Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_time(at), "14:07:09 Tue Mar 5 2024");
    }
}
