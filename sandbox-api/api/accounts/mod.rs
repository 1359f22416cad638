pub mod handlers;

use axum::routing::{get, put};
use axum::Router;

use crate::api::AppState;

/// Read and cleanup routes; any authenticated caller.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/{kind}", get(handlers::list_accounts))
        .route("/accounts/{kind}/{account}", get(handlers::get_account))
        .route("/accounts/{kind}/{account}/cleanup", put(handlers::mark_for_cleanup))
        .route("/accounts/{kind}/{account}/status", get(handlers::get_status))
}
