//! Service orchestrator: owns the store, the worker and the web server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use formwork_core::Form;
use formwork_infra::config::ServiceConfig;
use formwork_infra::jobs::{PostAction, PreAction, Worker, WorkerHandle, WorkerStats, job_queue};
use formwork_infra::store::{SharedStore, SqliteStore, StoreError};
use formwork_infra::upstream::{UpstreamClient, login_exchange};

use crate::app::pages::Pages;
use crate::app::{AppServices, build_app};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

struct Running {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
    worker: WorkerHandle,
    store: SharedStore,
}

/// A form, its actions and the configuration they run under.
///
/// Nothing happens until [`Service::start`]; [`Service::stop`] tears the
/// pieces down in reverse order.
pub struct Service {
    form: Form,
    pre_action: Option<PreAction>,
    post_action: Option<PostAction>,
    config: ServiceConfig,
    running: Option<Running>,
}

impl Service {
    pub fn new(
        form: Form,
        pre_action: Option<PreAction>,
        post_action: Option<PostAction>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            form,
            pre_action,
            post_action,
            config,
            running: None,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Open the store, log the bot in, start the worker and then the web
    /// server. Returns the address the server listens on.
    ///
    /// Any failure is fatal; whatever was already opened is closed again.
    pub async fn start(&mut self) -> Result<SocketAddr, ServiceError> {
        if self.running.is_some() {
            return Err(ServiceError::Configuration("service already started".into()));
        }
        self.config.log_summary();

        self.form
            .validate()
            .map_err(|e| ServiceError::Configuration(format!("invalid form: {e}")))?;
        if self.pre_action.is_none() && self.post_action.is_none() {
            return Err(ServiceError::Configuration(
                "neither a pre-action nor a post-action is configured".into(),
            ));
        }
        let upstream = &self.config.upstream;
        let (Some(web), Some(username), Some(password)) =
            (&upstream.web, &upstream.username, &upstream.password)
        else {
            return Err(ServiceError::Configuration(
                "upstream web address, bot username and password are required".into(),
            ));
        };
        let pages = Pages::new(web.as_str())
            .map_err(|e| ServiceError::Configuration(format!("page templates: {e}")))?;

        info!(db_path = %self.config.db_path, "opening database");
        let store: SharedStore = Arc::new(SqliteStore::connect(&self.config.db_path).await?);

        info!(server = %web, username = %username, "logging in to upstream");
        let bot = match login_exchange(
            &UpstreamClient::anonymous(web.as_str()),
            username,
            password,
            &self.config.token_name,
        )
        .await
        {
            Ok(token) => UpstreamClient::new(web.as_str(), token),
            Err(e) => {
                store.close().await;
                return Err(ServiceError::Configuration(format!("bot login failed: {e}")));
            }
        };

        info!(capacity = self.config.queue_capacity, "starting worker");
        let (queue, receiver) = job_queue(store.clone(), self.config.queue_capacity);
        let worker = Worker::new(store.clone(), bot.clone(), self.post_action.clone()).spawn(receiver);
        info!("worker started");

        let services = Arc::new(AppServices {
            form: self.form.clone(),
            pre_action: self.pre_action.clone(),
            store: store.clone(),
            queue,
            bot,
            policy: self.config.session_policy(),
            token_name: self.config.token_name.clone(),
            pages,
            assets_dir: self.config.assets_dir.clone(),
        });

        info!(port = self.config.port, "starting web service");
        let listener = match TcpListener::bind(("0.0.0.0", self.config.port)).await {
            Ok(listener) => listener,
            Err(e) => {
                worker.stop(self.config.shutdown).await;
                store.close().await;
                return Err(e.into());
            }
        };
        let addr = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();
        let app = build_app(services);
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await
        });
        info!(%addr, "web server started");

        self.running = Some(Running {
            addr,
            shutdown,
            server,
            worker,
            store,
        });
        Ok(addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    pub fn worker_stats(&self) -> Option<WorkerStats> {
        self.running.as_ref().map(|r| r.worker.stats())
    }

    /// Stop accepting requests, stop the worker and close the store.
    ///
    /// Jobs still queued are not run and stay unfinished in the store.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        info!("stopping web service");
        let _ = running.shutdown.send(());
        match running.server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "web server exited with error"),
            Err(e) => error!(error = %e, "web server task ended abnormally"),
        }

        info!(policy = ?self.config.shutdown, "stopping worker queue");
        let stats = running.worker.stats();
        running.worker.stop(self.config.shutdown).await;
        info!(
            processed = stats.jobs_processed,
            failed = stats.jobs_failed,
            panicked = stats.jobs_panicked,
            "worker stopped"
        );

        info!("closing database connection");
        running.store.close().await;
        info!("service stopped");
    }
}

/// Resolve when the process receives Ctrl-C.
pub async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for interrupt signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use formwork_core::{Element, Page};
    use formwork_infra::jobs::{ActionOutcome, post_action};

    use super::*;

    fn form() -> Form {
        Form::new(
            "Echo",
            vec![Page {
                description: String::new(),
                elements: vec![Element::new("name", "Name")],
            }],
        )
    }

    fn config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.db_path = ":memory:".into();
        config.port = 0;
        config.upstream.web = Some("http://127.0.0.1:9".into());
        config.upstream.username = Some("bot".into());
        config.upstream.password = Some("pw".into());
        config
    }

    fn echo() -> PostAction {
        post_action(|_, _| async { ActionOutcome::ok(Vec::new()) })
    }

    #[tokio::test]
    async fn start_requires_an_action() {
        let mut service = Service::new(form(), None, None, config());
        let err = service.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(m) if m.contains("post-action")));
    }

    #[tokio::test]
    async fn start_requires_a_usable_form() {
        let mut service = Service::new(Form::default(), None, Some(echo()), config());
        let err = service.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(m) if m.contains("invalid form")));
    }

    #[tokio::test]
    async fn start_requires_bot_credentials() {
        let mut cfg = config();
        cfg.upstream.password = None;
        let mut service = Service::new(form(), None, Some(echo()), cfg);
        let err = service.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(m) if m.contains("password")));
    }

    #[tokio::test]
    async fn failed_bot_login_is_fatal() {
        let mut service = Service::new(form(), None, Some(echo()), config());
        let err = service.start().await.unwrap_err();
        assert!(matches!(err, ServiceError::Configuration(m) if m.contains("bot login failed")));
        assert!(service.local_addr().is_none());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let mut service = Service::new(form(), None, Some(echo()), config());
        service.stop().await;
        assert!(service.worker_stats().is_none());
    }
}
