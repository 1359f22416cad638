//! Bearer-token gate.
//!
//! Tokens are HS256 JWTs signed with `JWT_AUTH_SECRET`. Any valid token opens
//! the read and cleanup routes; lifecycle actions and the worker job routes
//! need `role = admin`. Token issuance lives outside this service.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hyper::header::AUTHORIZATION;
use hyper::StatusCode;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    App,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub name: String,
    pub role: Role,
    pub exp: u64,
}

/// Verified caller, stored in request extensions by the gate.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub name: String,
    pub role: Role,
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("admin role required")]
    Forbidden,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingToken | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
        };
        let body = Json(json!({
            "http_code": status.as_u16(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<CallerIdentity, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(AuthError::InvalidToken)?;
        Ok(CallerIdentity {
            name: data.claims.name,
            role: data.claims.role,
        })
    }

    fn authenticate(&self, req: &Request) -> Result<CallerIdentity, AuthError> {
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        self.verify(token)
    }
}

pub async fn require_access(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match state.jwt.authenticate(&req) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %req.uri().path(), "rejected request");
            e.into_response()
        }
    }
}

pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let identity = match state.jwt.authenticate(&req) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(error = %e, path = %req.uri().path(), "rejected request");
            return e.into_response();
        }
    };
    if identity.role != Role::Admin {
        tracing::warn!(caller = %identity.name, path = %req.uri().path(), "non-admin caller on admin route");
        return AuthError::Forbidden.into_response();
    }
    req.extensions_mut().insert(identity);
    next.run(req).await
}
