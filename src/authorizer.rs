use crate::{
    error::AuthError,
    front_door::FrontDoor,
    models::{AuthorizationScope, AuthorizeRequest, PackageManifest, VersionDescriptor},
    stash::StashClient,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Decides whether the bearer of a login token may read or publish a package.
pub struct Authorizer {
    client: Arc<StashClient>,
    front_door: FrontDoor,
}

impl Authorizer {
    pub fn new(client: Arc<StashClient>, front_door: FrontDoor) -> Self {
        Self { client, front_door }
    }

    #[instrument(skip(self, request), fields(path, method))]
    pub async fn authorize(&self, request: &AuthorizeRequest) -> Result<bool, AuthError> {
        let Some(authorization) = request
            .headers
            .as_ref()
            .and_then(|headers| headers.authorization.as_deref())
        else {
            return Err(AuthError::Validation(
                "missing credentials data from request".to_string(),
            ));
        };
        let token = authorization
            .strip_prefix("Bearer ")
            .unwrap_or(authorization);

        let Some(path) = request.path.as_deref() else {
            return Err(AuthError::Validation(
                "missing package path from request".to_string(),
            ));
        };
        let scope = AuthorizationScope::from_method(request.method.as_deref());

        let descriptor = self.effective_descriptor(path, request.body.as_ref()).await?;
        debug!(
            name = descriptor.name.as_deref().unwrap_or("<unknown>"),
            version = descriptor.version.as_deref().unwrap_or("<unknown>"),
            "using package descriptor"
        );

        match scope {
            AuthorizationScope::Read => self.client.has_read_permission(token, &descriptor).await,
            AuthorizationScope::Publish => {
                self.client.has_publish_permission(token, &descriptor).await
            }
        }
    }

    /// The descriptor of record: a previously published manifest from the
    /// front door wins over the inbound body, so a re-publish cannot move the
    /// package to another repository. A front-door miss is the first-publish
    /// case and falls back to the request body.
    async fn effective_descriptor(
        &self,
        path: &str,
        body: Option<&PackageManifest>,
    ) -> Result<VersionDescriptor, AuthError> {
        match self.front_door.fetch_descriptor(path).await? {
            Some(manifest) => latest_version(&manifest).cloned(),
            None => {
                let Some(body) = body else {
                    return Err(AuthError::Validation(
                        "missing package data from request".to_string(),
                    ));
                };
                latest_version(body).cloned()
            }
        }
    }
}

fn latest_version(manifest: &PackageManifest) -> Result<&VersionDescriptor, AuthError> {
    let Some(latest) = manifest.dist_tags.latest.as_deref() else {
        return Err(AuthError::Validation(
            "package descriptor has no dist-tags.latest".to_string(),
        ));
    };
    manifest
        .versions
        .get(latest)
        .ok_or_else(|| AuthError::Validation(format!("package descriptor has no version {latest}")))
}
