use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::repository::JobRepository;
use super::{JobStatus, LifecycleResourceJob, NewJob};
use crate::db::{dt_to_ms, ms_to_dt, Migration, SqliteHandle};
use crate::error::StoreError;

const JOB_MIGRATIONS: &[Migration] = &[Migration {
    version: 100,
    name: "lifecycle_resource_jobs",
    sql: r#"
        CREATE TABLE IF NOT EXISTS lifecycle_resource_jobs (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          resource_type TEXT NOT NULL,
          resource_name TEXT NOT NULL,
          request_id TEXT NOT NULL,
          action TEXT NOT NULL,
          status TEXT NOT NULL,
          result TEXT,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_resource_updated
          ON lifecycle_resource_jobs(resource_name, updated_at_ms DESC, id DESC);
        CREATE INDEX IF NOT EXISTS idx_jobs_status_created
          ON lifecycle_resource_jobs(status, created_at_ms, id);
        CREATE INDEX IF NOT EXISTS idx_jobs_request_id
          ON lifecycle_resource_jobs(request_id);
    "#,
}];

const JOB_COLUMNS: &str =
    "id, resource_type, resource_name, request_id, action, status, result, created_at_ms, updated_at_ms";

#[derive(Clone)]
pub struct SqliteJobRepository {
    db: SqliteHandle,
}

impl SqliteJobRepository {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Ok(Self {
            db: SqliteHandle::open(path, JOB_MIGRATIONS)?,
        })
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: NewJob, now: DateTime<Utc>) -> Result<LifecycleResourceJob, StoreError> {
        self.db
            .call(move |conn| {
                let ts = dt_to_ms(now);
                conn.execute(
                    "INSERT INTO lifecycle_resource_jobs
                       (resource_type, resource_name, request_id, action, status, result, created_at_ms, updated_at_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)",
                    params![
                        job.resource_type,
                        job.resource_name,
                        job.request_id,
                        job.action.as_str(),
                        JobStatus::New.as_str(),
                        ts,
                    ],
                )?;
                Ok(LifecycleResourceJob {
                    id: conn.last_insert_rowid(),
                    resource_type: job.resource_type,
                    resource_name: job.resource_name,
                    request_id: job.request_id,
                    action: job.action,
                    status: JobStatus::New,
                    result: None,
                    created_at: ms_to_dt(ts)?,
                    updated_at: ms_to_dt(ts)?,
                })
            })
            .await
    }

    async fn advance(
        &self,
        id: i64,
        expected_prior: JobStatus,
        status: JobStatus,
        result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Option<LifecycleResourceJob>, StoreError> {
        let result = result
            .map(|value| serde_json::to_string(&value))
            .transpose()
            .map_err(|e| StoreError::Decode(format!("job {id} result: {e}")))?;
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "UPDATE lifecycle_resource_jobs
                         SET status = ?1, result = ?2, updated_at_ms = ?3
                         WHERE id = ?4 AND status = ?5
                         RETURNING {JOB_COLUMNS}"
                    ),
                    params![status.as_str(), result, dt_to_ms(now), id, expected_prior.as_str()],
                    |row| Ok(map_row_to_job(row)),
                )
                .optional()?
                .transpose()
            })
            .await
    }

    async fn get(&self, id: i64) -> Result<Option<LifecycleResourceJob>, StoreError> {
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM lifecycle_resource_jobs WHERE id = ?1"),
                    params![id],
                    |row| Ok(map_row_to_job(row)),
                )
                .optional()?
                .transpose()
            })
            .await
    }

    async fn latest_for_resource(&self, resource_name: &str) -> Result<Option<LifecycleResourceJob>, StoreError> {
        let resource_name = resource_name.to_string();
        self.db
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {JOB_COLUMNS} FROM lifecycle_resource_jobs
                         WHERE resource_name = ?1
                         ORDER BY updated_at_ms DESC, id DESC
                         LIMIT 1"
                    ),
                    params![resource_name],
                    |row| Ok(map_row_to_job(row)),
                )
                .optional()?
                .transpose()
            })
            .await
    }

    async fn list_by_status(&self, status: JobStatus, limit: u32) -> Result<Vec<LifecycleResourceJob>, StoreError> {
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM lifecycle_resource_jobs
                     WHERE status = ?1
                     ORDER BY created_at_ms ASC, id ASC
                     LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![status.as_str(), limit], |row| Ok(map_row_to_job(row)))?;
                let mut jobs = Vec::new();
                for row in rows {
                    jobs.push(row??);
                }
                Ok(jobs)
            })
            .await
    }
}

fn map_row_to_job(row: &Row) -> Result<LifecycleResourceJob, StoreError> {
    let id: i64 = row.get(0)?;
    let action: String = row.get(4)?;
    let status: String = row.get(5)?;
    let result: Option<String> = row.get(6)?;

    let result = result
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| StoreError::Decode(format!("job {id} result: {e}")))?;

    Ok(LifecycleResourceJob {
        id,
        resource_type: row.get(1)?,
        resource_name: row.get(2)?,
        request_id: row.get(3)?,
        action: action
            .parse()
            .map_err(|e| StoreError::Decode(format!("job {id}: {e}")))?,
        status: status
            .parse()
            .map_err(|e| StoreError::Decode(format!("job {id}: {e}")))?,
        result,
        created_at: ms_to_dt(row.get(7)?)?,
        updated_at: ms_to_dt(row.get(8)?)?,
    })
}
