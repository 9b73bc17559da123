use crate::{
    config::StashConfig,
    error::AuthError,
    models::{PermissionLevel, PermissionPage, UserRecord, VersionDescriptor},
    repository,
    token::{AuthMode, TokenClaims, TokenCodec},
};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

const API_10_BASE_PATH: &str = "/rest/api/1.0";

/// What satisfies "read access". Selected once at construction; an unknown
/// policy name is rejected here, never at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadAuthorizationPolicy {
    RepositoryReadPermission,
    Authenticated,
}

impl ReadAuthorizationPolicy {
    pub fn parse(name: &str) -> Result<Self, AuthError> {
        match name {
            "repository-read-permission" => Ok(Self::RepositoryReadPermission),
            "authenticated" => Ok(Self::Authenticated),
            other => Err(AuthError::UnknownReadPolicy(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RepositoryReadPermission => "repository-read-permission",
            Self::Authenticated => "authenticated",
        }
    }
}

/// Client for the Stash REST API. The identity check authenticates as the end
/// user; the permission check always authenticates as the fixed service
/// account. Read-only after construction.
pub struct StashClient {
    base_url: Url,
    api_root: String,
    http: Client,
    service_user: String,
    service_password: String,
    codec: TokenCodec,
    login_token_ttl_seconds: i64,
    read_policy: ReadAuthorizationPolicy,
}

impl std::fmt::Debug for StashClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StashClient")
            .field("base_url", &self.base_url)
            .field("api_root", &self.api_root)
            .field("service_user", &self.service_user)
            .field("login_token_ttl_seconds", &self.login_token_ttl_seconds)
            .field("read_policy", &self.read_policy)
            .finish_non_exhaustive()
    }
}

impl StashClient {
    pub fn new(cfg: &StashConfig) -> Result<Self, AuthError> {
        let api_root = cfg.host.trim().trim_end_matches('/').to_string();
        let base_url = Url::parse(&api_root)
            .map_err(|err| AuthError::Validation(format!("invalid stash host {}: {err}", cfg.host)))?;
        if cfg.token_encryption_key.is_empty() {
            return Err(AuthError::Validation(
                "stash token encryption key is required".to_string(),
            ));
        }
        let read_policy = ReadAuthorizationPolicy::parse(&cfg.read_authorization_policy)?;

        let timeout = Duration::from_millis(cfg.http_timeout_ms.max(250));
        let connect_timeout = timeout.min(Duration::from_secs(3));
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(15))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|_| AuthError::Internal)?;

        info!(
            host = api_root.as_str(),
            read_policy = read_policy.as_str(),
            "configured stash client"
        );

        Ok(Self {
            base_url,
            api_root,
            http,
            service_user: cfg.user.clone(),
            service_password: cfg.password.clone(),
            codec: TokenCodec::new(&cfg.token_encryption_key),
            login_token_ttl_seconds: cfg.login_token_ttl_seconds,
            read_policy,
        })
    }

    /// Verifies the username/password pair against the Stash user endpoint
    /// (Stash itself performs the password check) and mints a login token for
    /// an active user.
    #[instrument(skip(self, password))]
    pub async fn basic_auth(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserRecord, String), AuthError> {
        let url = format!(
            "{}{API_10_BASE_PATH}/users/{}",
            self.api_root,
            urlencoding::encode(username)
        );
        let response = self
            .http
            .get(url)
            .basic_auth(username, Some(password))
            .send()
            .await
            .map_err(|err| {
                error!(error = %err, "identity request failed");
                AuthError::Network(err.to_string())
            })?;

        let status = response.status();
        let data = response
            .json::<Value>()
            .await
            .ok()
            .filter(|value| !value.is_null());
        let Some(data) = data else {
            warn!(
                status = status.as_u16(),
                "empty response from server to authentication request"
            );
            return Err(AuthError::Credentials(format!(
                "no data from server ({})",
                status.as_u16()
            )));
        };

        if status == StatusCode::OK {
            let user: UserRecord = serde_json::from_value(data)
                .map_err(|err| AuthError::Credentials(format!("malformed user record: {err}")))?;
            if !user.active {
                info!("login rejected, user is not active");
                return Err(AuthError::Credentials("user is inactive".to_string()));
            }
            let token = self.build_basic_token(username)?;
            debug!("authentication success");
            return Ok((user, token));
        }

        let message = extract_error_message(&data)
            .unwrap_or_else(|| format!("unknown error ({})", status.as_u16()));
        warn!(
            status = status.as_u16(),
            message = message.as_str(),
            "login error"
        );
        Err(AuthError::Credentials(message))
    }

    fn build_basic_token(&self, username: &str) -> Result<String, AuthError> {
        let expires_at = Utc::now().timestamp_millis() + self.login_token_ttl_seconds * 1000;
        self.codec
            .encode(&TokenClaims {
                mode: AuthMode::HttpBasic,
                username: username.to_string(),
                nonce: String::new(),
                expires_at: Some(expires_at),
            })
            .map_err(|err| {
                error!(username, error = %err, "failed to generate login token");
                err
            })
    }

    /// A token that fails to decode is an error. A well-formed token that is
    /// expired, or lacks an expiry entirely, is a missing session, not an
    /// error; callers can tell "relogin" apart from "broken".
    pub fn validate_token(&self, token: &str) -> Result<Option<TokenClaims>, AuthError> {
        let claims = self.codec.decode(token).map_err(|err| {
            warn!(error = %err, "failed to decode login token");
            err
        })?;
        match claims.expires_at {
            Some(expires_at) if expires_at >= Utc::now().timestamp_millis() => {
                debug!(username = claims.username.as_str(), "login token validated");
                Ok(Some(claims))
            }
            _ => {
                warn!(username = claims.username.as_str(), "login token expired");
                Ok(None)
            }
        }
    }

    pub async fn has_read_permission(
        &self,
        token: &str,
        descriptor: &VersionDescriptor,
    ) -> Result<bool, AuthError> {
        match self.read_policy {
            ReadAuthorizationPolicy::RepositoryReadPermission => {
                self.check_with_token(token, descriptor, PermissionLevel::READ)
                    .await
            }
            ReadAuthorizationPolicy::Authenticated => self.is_authenticated(token),
        }
    }

    pub async fn has_publish_permission(
        &self,
        token: &str,
        descriptor: &VersionDescriptor,
    ) -> Result<bool, AuthError> {
        self.check_with_token(token, descriptor, PermissionLevel::PUBLISH)
            .await
    }

    async fn check_with_token(
        &self,
        token: &str,
        descriptor: &VersionDescriptor,
        required: &[PermissionLevel],
    ) -> Result<bool, AuthError> {
        let Some(claims) = self.validate_token(token)? else {
            return Ok(false);
        };
        self.has_any_permission(&claims.username, descriptor, required)
            .await
    }

    /// No repository lookup at all under the `authenticated` policy. An
    /// invalid or expired token is a hard error here so the client knows to
    /// log in again.
    fn is_authenticated(&self, token: &str) -> Result<bool, AuthError> {
        match self.validate_token(token) {
            Ok(Some(_)) => Ok(true),
            Ok(None) | Err(_) => Err(AuthError::Credentials(
                "token not valid, relogin required".to_string(),
            )),
        }
    }

    /// Queries the repository's user permissions as the service account and
    /// decides membership in `required`. An absent or inactive matching user
    /// is a `false` result, not an error.
    #[instrument(skip(self, descriptor, required))]
    pub async fn has_any_permission(
        &self,
        username: &str,
        descriptor: &VersionDescriptor,
        required: &[PermissionLevel],
    ) -> Result<bool, AuthError> {
        let reference = repository::resolve(descriptor, &self.base_url)?;
        info!(
            repository = reference.path.as_str(),
            "checking repository permission"
        );

        let url = format!(
            "{}{API_10_BASE_PATH}{}/permissions/users",
            self.api_root, reference.path
        );
        let response = self
            .http
            .get(url)
            .query(&[("filter", username)])
            .basic_auth(&self.service_user, Some(&self.service_password))
            .send()
            .await
            .map_err(|err| {
                error!(error = %err, "permission query failed");
                AuthError::Network(err.to_string())
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let data = response.json::<Value>().await.ok();
            let message = data
                .as_ref()
                .and_then(extract_error_message)
                .unwrap_or_else(|| {
                    "no valid response data received to a failed request".to_string()
                });
            match status {
                StatusCode::UNAUTHORIZED => {
                    warn!(message = message.as_str(), "wrong credentials to stash api");
                }
                StatusCode::NOT_FOUND => {
                    warn!(message = message.as_str(), "repository not found from stash");
                }
                _ => {
                    error!(
                        status = status.as_u16(),
                        message = message.as_str(),
                        "non-success response to repository permission check"
                    );
                }
            }
            return Err(AuthError::PermissionQuery {
                status: status.as_u16(),
                message,
            });
        }

        let page = response
            .json::<PermissionPage>()
            .await
            .map_err(|err| AuthError::PermissionQuery {
                status: status.as_u16(),
                message: format!("malformed permission response: {err}"),
            })?;

        // The filter is server-side prefix matching; the exact match happens here.
        let Some(grant) = page.values.iter().find(|grant| grant.user.name == username) else {
            info!("no permission entry for user");
            return Ok(false);
        };
        if !grant.user.active {
            info!("user not active, not authorizing");
            return Ok(false);
        }
        let allowed = required
            .iter()
            .any(|level| level.as_api_str() == grant.permission);
        info!(
            permission = grant.permission.as_str(),
            allowed, "permission check result"
        );
        Ok(allowed)
    }
}

fn extract_error_message(data: &Value) -> Option<String> {
    data.get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|entry| entry.get("message"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}
