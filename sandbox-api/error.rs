use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use hyper::StatusCode;
use serde_json::json;

use crate::jobs::JobStatus;

/// Infrastructure faults raised by a store backend.
///
/// Backends map driver errors into these variants; "no such row" is never a
/// `StoreError`, stores return `Option`/`bool` for that instead.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(format!("sqlite: {err}"))
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend(format!("mongodb: {err}"))
    }
}

/// Domain errors surfaced by the account provider, the job ledger and the
/// status resolver.
#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("no lifecycle job recorded for account {0}")]
    NoJobHistory(String),

    #[error("lifecycle job not found: {0}")]
    JobNotFound(i64),

    #[error("illegal transition for job {job_id}: {from} -> {to}")]
    Conflict {
        job_id: i64,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LifecycleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            LifecycleError::AccountNotFound(_)
            | LifecycleError::NoJobHistory(_)
            | LifecycleError::JobNotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::Conflict { .. } => StatusCode::CONFLICT,
            LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
            LifecycleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to API callers. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            LifecycleError::AccountNotFound(_) => "Account not found".to_string(),
            LifecycleError::NoJobHistory(_) => "Account status not found".to_string(),
            LifecycleError::JobNotFound(_) => "Lifecycle job not found".to_string(),
            LifecycleError::Conflict { .. } | LifecycleError::Validation(_) => self.to_string(),
            LifecycleError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "http_code": status.as_u16(),
            "message": self.public_message(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_variants_map_to_404() {
        assert_eq!(
            LifecycleError::AccountNotFound("ghost-acct".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LifecycleError::NoJobHistory("acct-042".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(LifecycleError::JobNotFound(7).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_displays_transition() {
        let err = LifecycleError::Conflict {
            job_id: 3,
            from: JobStatus::Success,
            to: JobStatus::Running,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "illegal transition for job 3: success -> running");
    }

    #[test]
    fn internal_message_is_generic() {
        let err = LifecycleError::Internal("mongodb: connection refused on 10.0.0.4".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
        assert!(!err.public_message().contains("10.0.0.4"));
    }

    #[test]
    fn timeout_displays_duration() {
        let err = StoreError::Timeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "store call timed out after 2s");
    }

    #[test]
    fn sqlite_error_converts_via_from() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(err.to_string().starts_with("backend error: sqlite:"));
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
        assert_send_sync::<LifecycleError>();
    }
}
