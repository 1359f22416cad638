use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::accounts::AccountKind;
use crate::api::auth::CallerIdentity;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::middleware::REQUEST_ID_HEADER;
use crate::api::AppState;
use crate::error::LifecycleError;
use crate::jobs::{JobStatus, LifecycleAction, LifecycleResourceJob};

pub(crate) type AccountPath = ApiPath<(AccountKind, String)>;

/// POST /api/v1/accounts/{kind}/{account}/{action}: queue a job and
/// acknowledge with 202. The worker performs the action later.
///
/// One route per action; the router binds `action` in a closure.
pub(crate) async fn request_action(
    action: LifecycleAction,
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    ApiPath((kind, account)): AccountPath,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Value>), LifecycleError> {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!(caller = %caller.name, kind = %kind, account = %account, action = %action, "lifecycle action requested");

    let job = state.ledger.create(kind, &account, &request_id, action).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "http_code": StatusCode::ACCEPTED.as_u16(),
            "message": format!("{action} request created"),
            "request_id": job.request_id,
            "job_id": job.id,
        })),
    ))
}

#[derive(Deserialize)]
pub(crate) struct ListJobsQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<u32>,
}

/// GET /api/v1/lifecycle/jobs: worker poll, oldest first, `new` by default.
pub(crate) async fn list_jobs(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ListJobsQuery>,
) -> Result<Json<Vec<LifecycleResourceJob>>, LifecycleError> {
    let status = query.status.unwrap_or(JobStatus::New);
    Ok(Json(state.ledger.list_by_status(status, query.limit).await?))
}

/// GET /api/v1/lifecycle/jobs/{id}
pub(crate) async fn get_job(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<LifecycleResourceJob>, LifecycleError> {
    Ok(Json(state.ledger.get(id).await?))
}

#[derive(Deserialize)]
pub(crate) struct AdvanceJobBody {
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<Value>,
}

/// PUT /api/v1/lifecycle/jobs/{id}: worker progress write-back.
pub(crate) async fn advance_job(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<AdvanceJobBody>,
) -> Result<Json<LifecycleResourceJob>, LifecycleError> {
    tracing::debug!(caller = %caller.name, job_id = id, status = %body.status, "job advance requested");
    Ok(Json(state.ledger.advance(id, body.status, body.result).await?))
}
