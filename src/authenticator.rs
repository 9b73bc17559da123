use crate::{
    error::AuthError,
    models::{AuthenticateRequest, AuthenticatedSession, CredentialsBody, SessionUser},
    stash::StashClient,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Exchanges a username/password pair for a login token. Shape validation
/// happens before any remote call.
pub struct Authenticator {
    client: Arc<StashClient>,
}

impl Authenticator {
    pub fn new(client: Arc<StashClient>) -> Self {
        Self { client }
    }

    #[instrument(skip(self, request))]
    pub async fn authenticate(
        &self,
        request: &AuthenticateRequest,
    ) -> Result<AuthenticatedSession, AuthError> {
        let Some((body, username, password)) = validate_credentials(request) else {
            warn!("invalid credentials, rejecting authentication");
            return Err(AuthError::Validation(
                "invalid credentials format".to_string(),
            ));
        };

        info!(username, "authenticating");
        let (user, token) = self.client.basic_auth(username, password).await.map_err(
            |err| {
                error!(username, error = %err, "authentication failed");
                err
            },
        )?;
        info!(username, "authentication success");

        Ok(AuthenticatedSession {
            token,
            user: SessionUser {
                username: username.to_string(),
                name: user
                    .display_name
                    .clone()
                    .unwrap_or_else(|| username.to_string()),
                email: body.email.clone(),
            },
        })
    }
}

fn validate_credentials(
    request: &AuthenticateRequest,
) -> Option<(&CredentialsBody, &str, &str)> {
    let body = request.body.as_ref()?;
    let username = body.name.as_deref().filter(|name| !name.is_empty())?;
    let password = body
        .password
        .as_deref()
        .filter(|password| !password.is_empty())?;
    Some((body, username, password))
}
