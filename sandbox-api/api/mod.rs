pub mod accounts;
pub mod auth;
pub mod extract;
pub mod lifecycle;
pub mod middleware;
mod routes;

use std::sync::Arc;

use axum::Router;

use crate::accounts::provider::AccountProvider;
use crate::jobs::ledger::JobLedger;
use crate::status::StatusResolver;
use auth::JwtVerifier;

#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountProvider,
    pub ledger: JobLedger,
    pub status: StatusResolver,
    pub jwt: Arc<JwtVerifier>,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}
