//! Service configuration.
//!
//! Values are resolved in three layers, later ones winning:
//!
//! 1. the JSON config file,
//! 2. `FORMWORK_*` environment variables,
//! 3. built-in defaults for anything still unset.
//!
//! Keys the service does not know are kept in [`ServiceConfig::extra`] so
//! that actions can read operator-specific settings from the same file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use formwork_auth::SessionPolicy;
use formwork_observability::LogFormat;

use crate::jobs::{DEFAULT_QUEUE_CAPACITY, ShutdownPolicy};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_COOKIE_NAME: &str = "formwork-session";
pub const DEFAULT_DB_PATH: &str = "./formwork.db";
pub const DEFAULT_COOKIE_MAX_AGE_DAYS: u32 = 7;
pub const DEFAULT_TOKEN_NAME: &str = "formwork";
pub const DEFAULT_ASSETS_DIR: &str = "./assets";
pub const MAX_COOKIE_MAX_AGE_DAYS: u32 = 3650;
pub const MAX_SESSION_MAX_AGE_SECS: u64 = 3650 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where the hosted VCS lives and how the bot logs in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the web/API server.
    pub web: Option<String>,
    /// Git server address, informational for actions.
    pub git: Option<String>,
    /// Bot account.
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceConfig {
    pub upstream: UpstreamConfig,
    pub port: u16,
    pub cookie_name: String,
    pub db_path: String,
    pub queue_capacity: usize,
    /// Server-side session lifetime; `None` keeps sessions until logout.
    pub session_max_age_secs: Option<u64>,
    pub cookie_max_age_days: u32,
    /// Name given to access tokens created at login.
    pub token_name: String,
    pub assets_dir: PathBuf,
    pub log_format: LogFormat,
    pub shutdown: ShutdownPolicy,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Keys that fell back to their built-in default.
    #[serde(skip)]
    pub defaulted: Vec<&'static str>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            port: DEFAULT_PORT,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            session_max_age_secs: None,
            cookie_max_age_days: DEFAULT_COOKIE_MAX_AGE_DAYS,
            token_name: DEFAULT_TOKEN_NAME.to_string(),
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            log_format: LogFormat::default(),
            shutdown: ShutdownPolicy::default(),
            extra: Map::new(),
            defaulted: Vec::new(),
        }
    }
}

/// File contents before defaults are applied; `None` means "not given".
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    upstream: UpstreamConfig,
    port: Option<u16>,
    cookie_name: Option<String>,
    db_path: Option<String>,
    queue_capacity: Option<usize>,
    session_max_age_secs: Option<u64>,
    cookie_max_age_days: Option<u32>,
    token_name: Option<String>,
    assets_dir: Option<PathBuf>,
    log_format: Option<LogFormat>,
    shutdown: Option<ShutdownPolicy>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ServiceConfig {
    /// Load from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let json = match path {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?),
            None => None,
        };
        Self::from_sources(json.as_deref(), |key| std::env::var(key).ok())
    }

    /// Resolve a configuration from optional JSON text and an environment
    /// lookup.
    pub fn from_sources<E>(json: Option<&str>, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let mut raw: RawConfig = match json {
            Some(text) if !text.trim().is_empty() => serde_json::from_str(text)?,
            _ => RawConfig::default(),
        };
        raw.apply_env(&env)?;
        let config = raw.resolve();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if self.cookie_name.trim().is_empty() {
            return Err(ConfigError::Invalid("cookie_name must not be empty".into()));
        }
        if self.cookie_name.contains([';', '=', ' ', ',']) {
            return Err(ConfigError::Invalid(format!(
                "cookie_name {:?} contains reserved characters",
                self.cookie_name
            )));
        }
        if self.token_name.trim().is_empty() {
            return Err(ConfigError::Invalid("token_name must not be empty".into()));
        }
        if self.cookie_max_age_days > MAX_COOKIE_MAX_AGE_DAYS {
            return Err(ConfigError::Invalid(format!(
                "cookie_max_age_days must be at most {MAX_COOKIE_MAX_AGE_DAYS}"
            )));
        }
        if self.session_max_age_secs.is_some_and(|s| s > MAX_SESSION_MAX_AGE_SECS) {
            return Err(ConfigError::Invalid(format!(
                "session_max_age_secs must be at most {MAX_SESSION_MAX_AGE_SECS}"
            )));
        }
        Ok(())
    }

    /// Session/cookie rules derived from this configuration.
    pub fn session_policy(&self) -> SessionPolicy {
        let mut policy = SessionPolicy::default().with_cookie_name(&self.cookie_name);
        let days = self.cookie_max_age_days.min(MAX_COOKIE_MAX_AGE_DAYS);
        policy.cookie_lifetime = chrono::Duration::days(i64::from(days));
        if let Some(secs) = self.session_max_age_secs {
            let secs = secs.min(MAX_SESSION_MAX_AGE_SECS) as i64;
            policy = policy.with_max_age(chrono::Duration::seconds(secs));
        }
        policy
    }

    /// Upstream keys that are neither configured nor defaultable.
    pub fn unset_keys(&self) -> Vec<&'static str> {
        [
            ("upstream.web", self.upstream.web.is_none()),
            ("upstream.git", self.upstream.git.is_none()),
            ("upstream.username", self.upstream.username.is_none()),
            ("upstream.password", self.upstream.password.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }

    /// Log which values were defaulted and which are missing.
    pub fn log_summary(&self) {
        for key in &self.defaulted {
            info!(key, "using default configuration value");
        }
        let unset = self.unset_keys();
        if !unset.is_empty() {
            warn!(keys = ?unset, "configuration values not set and without default");
        }
    }

    /// An operator-specific string setting from the config file.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

impl RawConfig {
    fn apply_env<E>(&mut self, env: &E) -> Result<(), ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(v) = env(key) {
                *slot = Some(v);
            }
        };
        set(&mut self.upstream.web, "FORMWORK_UPSTREAM_WEB");
        set(&mut self.upstream.git, "FORMWORK_UPSTREAM_GIT");
        set(&mut self.upstream.username, "FORMWORK_BOT_USERNAME");
        set(&mut self.upstream.password, "FORMWORK_BOT_PASSWORD");
        set(&mut self.cookie_name, "FORMWORK_COOKIE_NAME");
        set(&mut self.db_path, "FORMWORK_DB_PATH");

        if let Some(v) = env("FORMWORK_PORT") {
            self.port = Some(parse_env("FORMWORK_PORT", &v)?);
        }
        if let Some(v) = env("FORMWORK_QUEUE_CAPACITY") {
            self.queue_capacity = Some(parse_env("FORMWORK_QUEUE_CAPACITY", &v)?);
        }
        if let Some(v) = env("FORMWORK_SESSION_MAX_AGE") {
            self.session_max_age_secs = Some(parse_env("FORMWORK_SESSION_MAX_AGE", &v)?);
        }
        if let Some(v) = env("FORMWORK_LOG_FORMAT") {
            self.log_format = Some(parse_env("FORMWORK_LOG_FORMAT", &v)?);
        }
        Ok(())
    }

    fn resolve(self) -> ServiceConfig {
        let d = ServiceConfig::default();
        let mut defaulted = Vec::new();
        let mut note = |name: &'static str, given: bool| {
            if !given {
                defaulted.push(name);
            }
        };
        note("port", self.port.is_some());
        note("cookie_name", self.cookie_name.is_some());
        note("db_path", self.db_path.is_some());
        note("queue_capacity", self.queue_capacity.is_some());
        note("cookie_max_age_days", self.cookie_max_age_days.is_some());
        note("token_name", self.token_name.is_some());
        note("assets_dir", self.assets_dir.is_some());
        note("log_format", self.log_format.is_some());
        note("shutdown", self.shutdown.is_some());

        ServiceConfig {
            upstream: self.upstream,
            port: self.port.unwrap_or(d.port),
            cookie_name: self.cookie_name.unwrap_or(d.cookie_name),
            db_path: self.db_path.unwrap_or(d.db_path),
            queue_capacity: self.queue_capacity.unwrap_or(d.queue_capacity),
            session_max_age_secs: self.session_max_age_secs,
            cookie_max_age_days: self.cookie_max_age_days.unwrap_or(d.cookie_max_age_days),
            token_name: self.token_name.unwrap_or(d.token_name),
            assets_dir: self.assets_dir.unwrap_or(d.assets_dir),
            log_format: self.log_format.unwrap_or(d.log_format),
            shutdown: self.shutdown.unwrap_or(d.shutdown),
            extra: self.extra,
            defaulted,
        }
    }
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{key}={value:?}: {e}")))
}
