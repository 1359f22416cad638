use axum::body::Body;
use axum::http::Request;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use hyper::header;
use hyper::StatusCode;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::auth;
use super::middleware;
use super::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION]);

    let trace = TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_owned()
        };
        tracing::info_span!(
            "http_request",
            method = %req.method(),
            path = req.uri().path(),
            query = req.uri().query().unwrap_or_default(),
            host = %header("host"),
            request_id = %header(middleware::REQUEST_ID_HEADER),
        )
    });

    // Last layer runs first: blank ids are dropped before a fresh one is set,
    // and the id is in place before the trace span reads it.
    Router::new()
        .route("/ping", get(ping))
        .nest("/api/v1", api_router(&state))
        .fallback(not_found)
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::strip_trailing_slash))
        .layer(trace)
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(axum::middleware::from_fn(middleware::drop_blank_request_id))
}

fn api_router(state: &AppState) -> Router<AppState> {
    let access = Router::new()
        .route("/health", get(health))
        .merge(super::accounts::router())
        .route_layer(from_fn_with_state(state.clone(), auth::require_access));

    let admin = super::lifecycle::router()
        .route_layer(from_fn_with_state(state.clone(), auth::require_admin));

    access.merge(admin)
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "account_backend": state.accounts.backend(),
    }))
}

async fn not_found(req: axum::extract::Request) -> impl IntoResponse {
    tracing::warn!("unhandled path: {}", req.uri());
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "http_code": 404, "message": "Not Found" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::to_bytes;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::ServiceExt;

    use crate::accounts::provider::AccountProvider;
    use crate::accounts::sqlite_store::SqliteAccountStore;
    use crate::accounts::{Account, AccountKind};
    use crate::api::auth::{Claims, JwtVerifier, Role};
    use crate::jobs::ledger::JobLedger;
    use crate::jobs::LifecycleAction;
    use crate::jobs::sqlite_repository::SqliteJobRepository;
    use crate::status::StatusResolver;

    const SECRET: &str = "test-secret";

    async fn app() -> Router {
        let store = SqliteAccountStore::open(":memory:").unwrap();
        let mut acct = Account::new("acct-042", AccountKind::Aws);
        acct.service_uuid = Some("svc-1".into());
        store.insert(acct).await.unwrap();
        store.insert(Account::new("sandbox7", AccountKind::Aws)).await.unwrap();

        let accounts = AccountProvider::new(Arc::new(store), Duration::from_secs(5));
        let repo = SqliteJobRepository::open(":memory:").unwrap();
        let ledger = JobLedger::new(Arc::new(repo), accounts.clone(), Duration::from_secs(5));
        let status = StatusResolver::new(accounts.clone(), ledger.clone());

        build_router(AppState {
            accounts,
            ledger,
            status,
            jwt: Arc::new(JwtVerifier::new(SECRET)),
        })
    }

    fn token(role: Role) -> String {
        let claims = Claims {
            name: "tester".into(),
            role,
            exp: (chrono::Utc::now().timestamp() + 3600) as u64,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn request(method: &str, uri: &str, role: Option<Role>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(role)));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn ping_is_public() {
        let app = app().await;
        let (status, body) = send(&app, request("GET", "/ping", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let app = app().await;
        let (status, body) = send(&app, request("GET", "/api/v1/accounts/aws", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["http_code"], 401);
    }

    #[tokio::test]
    async fn app_token_cannot_request_actions() {
        let app = app().await;
        let (status, _) = send(
            &app,
            request("POST", "/api/v1/accounts/aws/acct-042/start", Some(Role::App), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn list_accounts_filters_and_sorts() {
        let app = app().await;
        let (status, body) = send(&app, request("GET", "/api/v1/accounts/aws", Some(Role::App), None)).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["sandbox7", "acct-042"]);

        let (status, body) = send(
            &app,
            request("GET", "/api/v1/accounts/aws?service_uuid=svc-1", Some(Role::App), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_list_is_404_with_empty_body() {
        let app = app().await;
        let (status, body) = send(&app, request("GET", "/api/v1/accounts/ocp", Some(Role::App), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn unknown_kind_is_bad_request() {
        let app = app().await;
        let (status, body) = send(&app, request("GET", "/api/v1/accounts/gcp", Some(Role::App), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["http_code"], 400);
        assert!(body["message"].as_str().unwrap().starts_with("validation failed: invalid path"));

        let (status, body) = send(
            &app,
            request("POST", "/api/v1/accounts/gcp/acct-042/start", Some(Role::Admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["http_code"], 400);
    }

    #[tokio::test]
    async fn malformed_query_and_body_are_json_bad_requests() {
        let app = app().await;
        for (method, uri, role, body) in [
            ("GET", "/api/v1/accounts/aws?available=maybe", Role::App, None),
            ("GET", "/api/v1/lifecycle/jobs?limit=-1", Role::Admin, None),
            ("GET", "/api/v1/lifecycle/jobs/abc", Role::Admin, None),
            ("PUT", "/api/v1/lifecycle/jobs/1", Role::Admin, Some(json!({ "status": "paused" }))),
        ] {
            let (status, body) = send(&app, request(method, uri, Some(role), body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
            assert_eq!(body["http_code"], 400, "{method} {uri}");
            assert!(body["message"].as_str().unwrap().starts_with("validation failed"));
        }
    }

    #[tokio::test]
    async fn get_account_and_missing_account() {
        let app = app().await;
        let (status, body) = send(
            &app,
            request("GET", "/api/v1/accounts/aws/acct-042", Some(Role::App), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name_int"], 42);

        let (status, body) = send(
            &app,
            request("GET", "/api/v1/accounts/aws/ghost-acct", Some(Role::App), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Account not found");
    }

    #[tokio::test]
    async fn cleanup_mark_is_idempotent() {
        let app = app().await;
        for _ in 0..2 {
            let (status, body) = send(
                &app,
                request("PUT", "/api/v1/accounts/aws/acct-042/cleanup", Some(Role::App), None),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["message"], "Account marked for cleanup");
        }
        let (_, body) = send(
            &app,
            request("GET", "/api/v1/accounts/aws/acct-042", Some(Role::App), None),
        )
        .await;
        assert_eq!(body["to_cleanup"], true);
    }

    #[tokio::test]
    async fn lifecycle_round_trip_through_worker_endpoints() {
        let app = app().await;

        let (status, body) = send(
            &app,
            request("POST", "/api/v1/accounts/aws/acct-042/cleanup", Some(Role::Admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["http_code"], 202);
        assert_eq!(body["message"], "cleanup request created");
        assert!(!body["request_id"].as_str().unwrap().is_empty());
        let job_id = body["job_id"].as_i64().unwrap();

        let (status, pending) = send(&app, request("GET", "/api/v1/lifecycle/jobs", Some(Role::Admin), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending[0]["id"], job_id);
        assert_eq!(pending[0]["status"], "new");

        let uri = format!("/api/v1/lifecycle/jobs/{job_id}");
        let (status, _) = send(
            &app,
            request("PUT", &uri, Some(Role::Admin), Some(json!({ "status": "running" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, job) = send(
            &app,
            request("PUT", &uri, Some(Role::Admin), Some(json!({ "status": "success", "result": "done" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "success");

        let (status, body) = send(
            &app,
            request("GET", "/api/v1/accounts/aws/acct-042/status", Some(Role::App), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["result"], "done");
        assert_eq!(body["job_id"], job_id);

        let (status, body) = send(
            &app,
            request("PUT", &uri, Some(Role::Admin), Some(json!({ "status": "running" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["http_code"], 409);
    }

    #[tokio::test]
    async fn request_id_header_is_used_for_job() {
        let app = app().await;
        let mut req = request("POST", "/api/v1/accounts/aws/sandbox7/stop", Some(Role::Admin), None);
        req.headers_mut()
            .insert("x-request-id", "req-from-caller".parse().unwrap());
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["request_id"], "req-from-caller");
    }

    #[tokio::test]
    async fn blank_request_id_is_replaced_consistently() {
        let app = app().await;
        for blank in ["", "   "] {
            let mut req = request("POST", "/api/v1/accounts/aws/sandbox7/start", Some(Role::Admin), None);
            req.headers_mut()
                .insert("x-request-id", header::HeaderValue::from_static(blank));
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);
            let echoed = response.headers()["x-request-id"].to_str().unwrap().to_owned();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(!echoed.trim().is_empty());
            assert_eq!(body["request_id"], echoed.as_str());
        }
    }

    #[tokio::test]
    async fn every_action_route_queues_its_own_job() {
        let app = app().await;
        for action in LifecycleAction::ALL {
            let uri = format!("/api/v1/accounts/aws/acct-042/{action}");
            let (status, body) = send(&app, request("POST", &uri, Some(Role::Admin), None)).await;
            assert_eq!(status, StatusCode::ACCEPTED, "{uri}");
            assert_eq!(body["message"], format!("{action} request created"));

            let job_uri = format!("/api/v1/lifecycle/jobs/{}", body["job_id"]);
            let (status, job) = send(&app, request("GET", &job_uri, Some(Role::Admin), None)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(job["action"], action.as_str());
        }

        let (_, pending) = send(&app, request("GET", "/api/v1/lifecycle/jobs", Some(Role::Admin), None)).await;
        assert_eq!(pending.as_array().unwrap().len(), LifecycleAction::ALL.len());
    }

    #[tokio::test]
    async fn action_on_unknown_account_is_404() {
        let app = app().await;
        let (status, _) = send(
            &app,
            request("POST", "/api/v1/accounts/aws/ghost-acct/start", Some(Role::Admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, pending) = send(&app, request("GET", "/api/v1/lifecycle/jobs", Some(Role::Admin), None)).await;
        assert_eq!(pending, json!([]));
    }

    #[tokio::test]
    async fn status_without_history_is_404() {
        let app = app().await;
        let (status, body) = send(
            &app,
            request("GET", "/api/v1/accounts/aws/acct-042/status", Some(Role::App), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Account status not found");

        let (status, body) = send(
            &app,
            request("GET", "/api/v1/accounts/aws/ghost-acct/status", Some(Role::App), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Account not found");
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let app = app().await;
        let (status, body) = send(&app, request("GET", "/api/v1/lifecycle/jobs/999", Some(Role::Admin), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Lifecycle job not found");
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let app = app().await;
        let (status, _) = send(&app, request("GET", "/nope", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trailing_slash_redirects() {
        let app = app().await;
        let response = app
            .oneshot(request("GET", "/ping/?x=1", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/ping?x=1");
    }
}
