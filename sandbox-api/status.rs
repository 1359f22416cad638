use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::accounts::provider::AccountProvider;
use crate::accounts::AccountKind;
use crate::error::LifecycleError;
use crate::jobs::ledger::JobLedger;
use crate::jobs::{JobStatus, LifecycleAction, LifecycleResourceJob};

/// Caller-facing view of an account's most recent lifecycle job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountStatus {
    pub account_name: String,
    pub kind: AccountKind,
    pub job_id: i64,
    pub request_id: String,
    pub action: LifecycleAction,
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl AccountStatus {
    fn from_job(kind: AccountKind, job: LifecycleResourceJob) -> Self {
        Self {
            account_name: job.resource_name,
            kind,
            job_id: job.id,
            request_id: job.request_id,
            action: job.action,
            status: job.status,
            result: job.result,
            updated_at: job.updated_at,
        }
    }
}

/// Resolves status by account name, not by request id.
///
/// With several jobs in flight for one account the caller sees whichever was
/// updated last, which may not be the job it created. `job_id` and
/// `request_id` are returned so the caller can tell.
#[derive(Clone)]
pub struct StatusResolver {
    accounts: AccountProvider,
    ledger: JobLedger,
}

impl StatusResolver {
    pub fn new(accounts: AccountProvider, ledger: JobLedger) -> Self {
        Self { accounts, ledger }
    }

    pub async fn get_status(&self, kind: AccountKind, account_name: &str) -> Result<AccountStatus, LifecycleError> {
        let account = self.accounts.fetch_by_name(kind, account_name).await?;
        let job = self.ledger.read_latest(&account.name).await?;
        Ok(AccountStatus::from_job(account.kind, job))
    }
}
