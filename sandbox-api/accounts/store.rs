use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{Account, AccountFilter, AccountKind};
use crate::error::StoreError;

/// Uniform CRUD/query surface over an account backend.
///
/// "No match" is reported through `Option`/`bool`, never as an error, so
/// callers can tell an absent record from an infrastructure fault.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Short backend label for logs ("keyvalue", "relational").
    fn backend(&self) -> &'static str;

    /// Every record of `kind` matching `filter`, all pages accumulated.
    async fn scan(&self, kind: AccountKind, filter: &AccountFilter) -> Result<Vec<Account>, StoreError>;

    async fn get(&self, kind: AccountKind, name: &str) -> Result<Option<Account>, StoreError>;

    /// Set `to_cleanup`. Returns `false` when no record matched.
    async fn mark_for_cleanup(&self, kind: AccountKind, name: &str) -> Result<bool, StoreError>;
}

/// Bound a store call by `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| StoreError::Timeout(deadline))?
}
