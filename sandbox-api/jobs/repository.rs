use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{JobStatus, LifecycleResourceJob, NewJob};
use crate::error::StoreError;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: NewJob, now: DateTime<Utc>) -> Result<LifecycleResourceJob, StoreError>;

    /// Atomically move job `id` to `status`, but only while it is still in
    /// `expected_prior`. Returns the row as written, or `None` when no row
    /// matched.
    async fn advance(
        &self,
        id: i64,
        expected_prior: JobStatus,
        status: JobStatus,
        result: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Option<LifecycleResourceJob>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<LifecycleResourceJob>, StoreError>;

    /// Greatest `updated_at` for the account, ties broken by highest id.
    async fn latest_for_resource(&self, resource_name: &str) -> Result<Option<LifecycleResourceJob>, StoreError>;

    /// Oldest first.
    async fn list_by_status(&self, status: JobStatus, limit: u32) -> Result<Vec<LifecycleResourceJob>, StoreError>;
}
