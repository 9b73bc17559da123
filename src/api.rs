use crate::{
    app::AppState,
    error::AuthError,
    models::{AuthenticateRequest, AuthorizeRequest},
};
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::instrument;

#[instrument(skip_all)]
pub async fn authenticate(
    State(state): State<AppState>,
    Json(request): Json<AuthenticateRequest>,
) -> Result<Response, AuthError> {
    let session = state.authenticator.authenticate(&request).await?;
    Ok(Json(session).into_response())
}

#[instrument(skip_all)]
pub async fn authorize(
    State(state): State<AppState>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<Response, AuthError> {
    let allowed = state.authorizer.authorize(&request).await?;
    Ok(Json(json!({ "allowed": allowed })).into_response())
}

pub async fn ping() -> Response {
    Json(json!({})).into_response()
}
