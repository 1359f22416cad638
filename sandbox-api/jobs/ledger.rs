//! Job ledger: creates lifecycle jobs and enforces the forward-only status
//! machine when the worker writes progress back.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::repository::JobRepository;
use super::{JobStatus, LifecycleAction, LifecycleResourceJob, NewJob};
use crate::accounts::provider::AccountProvider;
use crate::accounts::store::with_deadline;
use crate::accounts::AccountKind;
use crate::error::{LifecycleError, StoreError};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct JobLedger {
    repo: Arc<dyn JobRepository>,
    accounts: AccountProvider,
    deadline: Duration,
}

impl JobLedger {
    pub fn new(repo: Arc<dyn JobRepository>, accounts: AccountProvider, deadline: Duration) -> Self {
        Self {
            repo,
            accounts,
            deadline,
        }
    }

    /// Record a new job in `new` status. The account must exist; otherwise
    /// nothing is written.
    pub async fn create(
        &self,
        kind: AccountKind,
        resource_name: &str,
        request_id: &str,
        action: LifecycleAction,
    ) -> Result<LifecycleResourceJob, LifecycleError> {
        self.accounts.fetch_by_name(kind, resource_name).await?;

        let job = NewJob {
            resource_type: kind.as_str().to_string(),
            resource_name: resource_name.to_string(),
            request_id: request_id.to_string(),
            action,
        };
        let job = with_deadline(self.deadline, self.repo.insert(job, Utc::now()))
            .await
            .map_err(|e| internal("insert", StoreContext::resource(resource_name), e))?;

        tracing::info!(
            job_id = job.id,
            account = %job.resource_name,
            action = %job.action,
            request_id = %job.request_id,
            "lifecycle job created"
        );
        Ok(job)
    }

    /// Worker write path. Succeeds only for `new -> running` and
    /// `running -> success|error`, applied as a conditional update.
    pub async fn advance(
        &self,
        job_id: i64,
        status: JobStatus,
        result: Option<serde_json::Value>,
    ) -> Result<LifecycleResourceJob, LifecycleError> {
        let Some(prior) = JobStatus::required_prior(status) else {
            let current = self.get(job_id).await?;
            return Err(LifecycleError::Conflict {
                job_id,
                from: current.status,
                to: status,
            });
        };

        let written = with_deadline(
            self.deadline,
            self.repo.advance(job_id, prior, status, result, Utc::now()),
        )
        .await
        .map_err(|e| internal("advance", StoreContext::job(job_id), e))?;

        if let Some(job) = written {
            tracing::info!(job_id, account = %job.resource_name, from = %prior, to = %status, "lifecycle job advanced");
            return Ok(job);
        }

        let current = self.get(job_id).await?;
        tracing::warn!(
            job_id,
            account = %current.resource_name,
            from = %current.status,
            to = %status,
            terminal = current.status.is_terminal(),
            "rejected job transition"
        );
        Err(LifecycleError::Conflict {
            job_id,
            from: current.status,
            to: status,
        })
    }

    /// Most recently updated job for the account.
    pub async fn read_latest(&self, resource_name: &str) -> Result<LifecycleResourceJob, LifecycleError> {
        with_deadline(self.deadline, self.repo.latest_for_resource(resource_name))
            .await
            .map_err(|e| internal("latest_for_resource", StoreContext::resource(resource_name), e))?
            .ok_or_else(|| LifecycleError::NoJobHistory(resource_name.to_string()))
    }

    pub async fn get(&self, job_id: i64) -> Result<LifecycleResourceJob, LifecycleError> {
        with_deadline(self.deadline, self.repo.get(job_id))
            .await
            .map_err(|e| internal("get", StoreContext::job(job_id), e))?
            .ok_or(LifecycleError::JobNotFound(job_id))
    }

    pub async fn list_by_status(
        &self,
        status: JobStatus,
        limit: Option<u32>,
    ) -> Result<Vec<LifecycleResourceJob>, LifecycleError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        with_deadline(self.deadline, self.repo.list_by_status(status, limit))
            .await
            .map_err(|e| internal("list_by_status", StoreContext::status(status), e))
    }
}

/// What a failed store call was about, for the error log.
#[derive(Default)]
struct StoreContext<'a> {
    job_id: Option<i64>,
    resource_name: Option<&'a str>,
    status: Option<JobStatus>,
}

impl<'a> StoreContext<'a> {
    fn job(job_id: i64) -> Self {
        Self {
            job_id: Some(job_id),
            ..Self::default()
        }
    }

    fn resource(resource_name: &'a str) -> Self {
        Self {
            resource_name: Some(resource_name),
            ..Self::default()
        }
    }

    fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

fn internal(operation: &'static str, context: StoreContext<'_>, err: StoreError) -> LifecycleError {
    tracing::error!(
        operation,
        job_id = context.job_id,
        account = context.resource_name,
        status = context.status.map(JobStatus::as_str),
        error = %err,
        "job ledger store call failed"
    );
    let subject = match (context.job_id, context.resource_name) {
        (Some(id), _) => format!(" job {id}"),
        (None, Some(name)) => format!(" account {name}"),
        (None, None) => String::new(),
    };
    LifecycleError::Internal(format!("job ledger {operation}{subject}: {err}"))
}
