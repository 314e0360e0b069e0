//! SQLite-backed store.
//!
//! One database file holds two tables, `jobs` and `sessions`, created on
//! connect when missing. List-valued columns (`messages`, `value_map`) are JSON
//! text; timestamps are RFC 3339 text.
//!
//! ## Error Mapping
//!
//! | sqlx error | StoreError |
//! |------------|------------|
//! | Database, unique/primary-key violation | `AlreadyExists` |
//! | Database, anything else | `Storage` |
//! | PoolClosed | `Storage` |
//! | RowNotFound | `NotFound` |
//! | Other | `Storage` |

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row};
use tracing::{debug, instrument};

use formwork_auth::Session;
use formwork_core::{JobId, SessionId, UserId, ValueMap};

use super::{JobStore, SessionStore, Store, StoreError};
use crate::jobs::Job;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     INTEGER NOT NULL,
        label       TEXT    NOT NULL,
        messages    TEXT    NOT NULL,
        error       TEXT,
        value_map   TEXT    NOT NULL,
        submit_time TEXT,
        end_time    TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS jobs_user_id ON jobs (user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id      TEXT    PRIMARY KEY NOT NULL,
        user_id INTEGER NOT NULL,
        token   TEXT    NOT NULL,
        created TEXT    NOT NULL
    )
    "#,
];

/// Store persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("open", e))?;
        Self::with_pool(pool).await
    }

    /// Private database that lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| map_sqlx_error("in_memory", e))?;
        // Every connection to :memory: is a separate database, so the pool
        // must never hold more than one or recycle it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("in_memory", e))?;
        Self::with_pool(pool).await
    }

    /// Open the store described by a configured path; `":memory:"` selects
    /// [`SqliteStore::in_memory`].
    pub async fn connect(path: &str) -> Result<Self, StoreError> {
        if path == ":memory:" || path == "sqlite::memory:" {
            Self::in_memory().await
        } else {
            Self::open(path).await
        }
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        debug!("database schema ready");
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl JobStore for SqliteStore {
    #[instrument(skip(self, job), fields(user_id = %job.user_id), err)]
    async fn insert_job(&self, mut job: Job) -> Result<Job, StoreError> {
        let messages = encode_json("insert_job", &job.messages)?;
        let values = encode_json("insert_job", &job.values)?;
        let requested = job.id.is_assigned().then(|| job.id.get());

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, user_id, label, messages, error, value_map, submit_time, end_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(requested)
        .bind(job.user_id.get())
        .bind(&job.label)
        .bind(messages)
        .bind(&job.error)
        .bind(values)
        .bind(job.submit_time)
        .bind(job.end_time)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_job", e))?;

        job.id = JobId::new(result.last_insert_rowid());
        Ok(job)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let messages = encode_json("update_job", &job.messages)?;
        let values = encode_json("update_job", &job.values)?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET user_id = ?, label = ?, messages = ?, error = ?, value_map = ?,
                submit_time = ?, end_time = ?
            WHERE id = ?
            "#,
        )
        .bind(job.user_id.get())
        .bind(&job.label)
        .bind(messages)
        .bind(&job.error)
        .bind(values)
        .bind(job.submit_time)
        .bind(job.end_time)
        .bind(job.id.get())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::job_not_found(job.id));
        }
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Job, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?
            .ok_or_else(|| StoreError::job_not_found(id))?;
        decode_job(&row)
    }

    async fn list_jobs_for_user(&self, user_id: UserId) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE user_id = ? ORDER BY id")
            .bind(user_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_jobs_for_user", e))?;
        rows.iter().map(decode_job).collect()
    }

    async fn list_all_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_all_jobs", e))?;
        rows.iter().map(decode_job).collect()
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id), err)]
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sessions (id, user_id, token, created) VALUES (?, ?, ?, ?)")
            .bind(session.id.as_str())
            .bind(session.user_id.get())
            .bind(&session.token)
            .bind(session.created)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_session", e))?;
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_session", e))?
            .ok_or_else(|| StoreError::session_not_found(id))?;
        let row = SessionRow::from_row(&row)
            .map_err(|e| StoreError::Storage(format!("failed to decode session row: {e}")))?;
        Ok(row.into())
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_session", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::session_not_found(id));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn close(&self) {
        self.pool.close().await;
    }
}

fn encode_json<T: serde::Serialize>(operation: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|e| StoreError::Storage(format!("failed to encode column in {operation}: {e}")))
}

fn decode_job(row: &SqliteRow) -> Result<Job, StoreError> {
    let row = JobRow::from_row(row)
        .map_err(|e| StoreError::Storage(format!("failed to decode job row: {e}")))?;
    row.try_into()
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            // 1555 = SQLITE_CONSTRAINT_PRIMARYKEY, 2067 = SQLITE_CONSTRAINT_UNIQUE
            let duplicate = db_err.is_unique_violation()
                || matches!(db_err.code().as_deref(), Some("1555") | Some("2067"));
            if duplicate {
                StoreError::AlreadyExists(msg)
            } else {
                StoreError::Storage(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("row not found in {}", operation)),
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct JobRow {
    id: i64,
    user_id: i64,
    label: String,
    messages: String,
    error: Option<String>,
    value_map: String,
    submit_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, SqliteRow> for JobRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(JobRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            label: row.try_get("label")?,
            messages: row.try_get("messages")?,
            error: row.try_get("error")?,
            value_map: row.try_get("value_map")?,
            submit_time: row.try_get("submit_time")?,
            end_time: row.try_get("end_time")?,
        })
    }
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let messages: Vec<String> = serde_json::from_str(&row.messages)
            .map_err(|e| StoreError::Storage(format!("job {}: bad messages column: {e}", row.id)))?;
        let values: ValueMap = serde_json::from_str(&row.value_map)
            .map_err(|e| StoreError::Storage(format!("job {}: bad value_map column: {e}", row.id)))?;
        Ok(Job {
            id: JobId::new(row.id),
            user_id: UserId::new(row.user_id),
            label: row.label,
            values,
            messages,
            error: row.error,
            submit_time: row.submit_time,
            end_time: row.end_time,
        })
    }
}

#[derive(Debug)]
struct SessionRow {
    id: String,
    user_id: i64,
    token: String,
    created: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for SessionRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(SessionRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            token: row.try_get("token")?,
            created: row.try_get("created")?,
        })
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: SessionId::from(row.id),
            user_id: UserId::new(row.user_id),
            token: row.token,
            created: row.created,
        }
    }
}
