use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// An empty or blank `x-request-id` counts as absent, so the id layer
/// generates one and the response header matches the id stored on the job.
pub async fn drop_blank_request_id(mut req: Request<Body>, next: Next) -> Response {
    let blank = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .is_some_and(|v| v.as_bytes().iter().all(u8::is_ascii_whitespace));
    if blank {
        req.headers_mut().remove(REQUEST_ID_HEADER);
    }
    next.run(req).await
}

/// Permanent redirect from `/path/` to `/path`, keeping the query string.
pub async fn strip_trailing_slash(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri();

    match uri.path().strip_suffix('/').filter(|p| !p.is_empty()) {
        Some(path) => {
            let target = match uri.query() {
                Some(query) => format!("{path}?{query}"),
                None => path.to_string(),
            };
            Redirect::permanent(&target).into_response()
        }
        None => next.run(req).await,
    }
}
