use crate::{api, authenticator::Authenticator, authorizer::Authorizer};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub authorizer: Arc<Authorizer>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/authenticate", post(api::authenticate))
        .route("/authorize", post(api::authorize))
        .route("/-/ping", get(api::ping))
        .with_state(state)
}
