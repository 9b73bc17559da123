use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Credentials(String),
    #[error("failed to decode login token: {0}")]
    TokenDecode(String),
    #[error("failed to generate login token: {0}")]
    TokenMint(String),
    #[error("{0}")]
    Network(String),
    #[error("repository host mismatch ({configured} != {requested})")]
    HostMismatch {
        configured: String,
        requested: String,
    },
    #[error("only git repositories are supported, ensure that repository.type is set to 'git'")]
    UnsupportedRepositoryType,
    #[error("{message}")]
    PermissionQuery { status: u16, message: String },
    #[error("{0}")]
    FrontDoor(String),
    #[error("unsupported read authorization policy: {0}")]
    UnknownReadPolicy(String),
    #[error("internal server error")]
    Internal,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_)
            | AuthError::HostMismatch { .. }
            | AuthError::UnsupportedRepositoryType => StatusCode::BAD_REQUEST,
            AuthError::Credentials(_) | AuthError::TokenDecode(_) => StatusCode::UNAUTHORIZED,
            AuthError::Network(_) | AuthError::PermissionQuery { .. } | AuthError::FrontDoor(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuthError::TokenMint(_) | AuthError::UnknownReadPolicy(_) | AuthError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AuthError {
    fn from(_: std::io::Error) -> Self {
        AuthError::Internal
    }
}
