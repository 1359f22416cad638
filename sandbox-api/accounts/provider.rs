use std::sync::Arc;
use std::time::Duration;

use super::store::{with_deadline, AccountStore};
use super::{sort_accounts, Account, AccountFilter, AccountKind};
use crate::error::{LifecycleError, StoreError};

/// Backend-agnostic facade over an [`AccountStore`].
///
/// The store is chosen at startup and injected here; handlers only ever see
/// this type. Store faults are logged with context and surfaced as
/// `Internal`, a missing record as `AccountNotFound`.
#[derive(Clone)]
pub struct AccountProvider {
    store: Arc<dyn AccountStore>,
    deadline: Duration,
}

impl AccountProvider {
    pub fn new(store: Arc<dyn AccountStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn fetch_all(&self, kind: AccountKind) -> Result<Vec<Account>, LifecycleError> {
        self.fetch_filtered(kind, &AccountFilter::default()).await
    }

    pub async fn fetch_all_by_service_uuid(
        &self,
        kind: AccountKind,
        service_uuid: &str,
    ) -> Result<Vec<Account>, LifecycleError> {
        self.fetch_filtered(kind, &AccountFilter::by_service_uuid(service_uuid))
            .await
    }

    pub async fn fetch_filtered(
        &self,
        kind: AccountKind,
        filter: &AccountFilter,
    ) -> Result<Vec<Account>, LifecycleError> {
        let mut accounts = with_deadline(self.deadline, self.store.scan(kind, filter))
            .await
            .map_err(|e| self.internal("scan", kind, None, e))?;
        sort_accounts(&mut accounts);
        Ok(accounts)
    }

    pub async fn fetch_by_name(&self, kind: AccountKind, name: &str) -> Result<Account, LifecycleError> {
        with_deadline(self.deadline, self.store.get(kind, name))
            .await
            .map_err(|e| self.internal("get", kind, Some(name), e))?
            .ok_or_else(|| LifecycleError::AccountNotFound(name.to_string()))
    }

    /// Idempotent: every call after the first is a successful no-op.
    pub async fn mark_for_cleanup(&self, kind: AccountKind, name: &str) -> Result<(), LifecycleError> {
        let matched = with_deadline(self.deadline, self.store.mark_for_cleanup(kind, name))
            .await
            .map_err(|e| self.internal("mark_for_cleanup", kind, Some(name), e))?;
        if !matched {
            return Err(LifecycleError::AccountNotFound(name.to_string()));
        }
        tracing::info!(kind = %kind, account = %name, "account marked for cleanup");
        Ok(())
    }

    fn internal(
        &self,
        operation: &'static str,
        kind: AccountKind,
        name: Option<&str>,
        err: StoreError,
    ) -> LifecycleError {
        tracing::error!(
            backend = self.store.backend(),
            operation,
            kind = %kind,
            account = name.unwrap_or("-"),
            error = %err,
            "account store call failed"
        );
        LifecycleError::Internal(format!("account store {operation}: {err}"))
    }
}
