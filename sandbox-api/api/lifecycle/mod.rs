pub mod handlers;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::api::auth::CallerIdentity;
use crate::api::AppState;
use crate::jobs::LifecycleAction;

/// Admin routes: lifecycle requests plus the worker-facing job endpoints.
pub fn router() -> Router<AppState> {
    let mut router = Router::new();
    for action in LifecycleAction::ALL {
        router = router.route(
            &format!("/accounts/{{kind}}/{{account}}/{action}"),
            post(
                move |state: State<AppState>,
                      caller: Extension<CallerIdentity>,
                      path: handlers::AccountPath,
                      headers: HeaderMap| {
                    handlers::request_action(action, state, caller, path, headers)
                },
            ),
        );
    }

    router
        .route("/lifecycle/jobs", get(handlers::list_jobs))
        .route("/lifecycle/jobs/{id}", get(handlers::get_job).put(handlers::advance_job))
}
