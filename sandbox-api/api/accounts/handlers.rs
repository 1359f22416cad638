use axum::extract::State;
use axum::Json;
use hyper::StatusCode;
use serde_json::{json, Value};

use crate::accounts::{Account, AccountFilter, AccountKind};
use crate::api::extract::{ApiPath, ApiQuery};
use crate::api::AppState;
use crate::error::LifecycleError;
use crate::status::AccountStatus;

/// GET /api/v1/accounts/{kind}: every account of a kind, optionally filtered.
///
/// An empty result is a 404 with an empty list body.
pub(crate) async fn list_accounts(
    State(state): State<AppState>,
    ApiPath(kind): ApiPath<AccountKind>,
    ApiQuery(filter): ApiQuery<AccountFilter>,
) -> Result<(StatusCode, Json<Vec<Account>>), LifecycleError> {
    let accounts = match (&filter.service_uuid, filter.available) {
        (None, None) => state.accounts.fetch_all(kind).await?,
        (Some(uuid), None) => state.accounts.fetch_all_by_service_uuid(kind, uuid).await?,
        _ => state.accounts.fetch_filtered(kind, &filter).await?,
    };
    let status = if accounts.is_empty() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    Ok((status, Json(accounts)))
}

/// GET /api/v1/accounts/{kind}/{account}
pub(crate) async fn get_account(
    State(state): State<AppState>,
    ApiPath((kind, account)): ApiPath<(AccountKind, String)>,
) -> Result<Json<Account>, LifecycleError> {
    Ok(Json(state.accounts.fetch_by_name(kind, &account).await?))
}

/// PUT /api/v1/accounts/{kind}/{account}/cleanup: idempotent.
pub(crate) async fn mark_for_cleanup(
    State(state): State<AppState>,
    ApiPath((kind, account)): ApiPath<(AccountKind, String)>,
) -> Result<Json<Value>, LifecycleError> {
    state.accounts.mark_for_cleanup(kind, &account).await?;
    Ok(Json(json!({ "message": "Account marked for cleanup" })))
}

/// GET /api/v1/accounts/{kind}/{account}/status
pub(crate) async fn get_status(
    State(state): State<AppState>,
    ApiPath((kind, account)): ApiPath<(AccountKind, String)>,
) -> Result<Json<AccountStatus>, LifecycleError> {
    Ok(Json(state.status.get_status(kind, &account).await?))
}
