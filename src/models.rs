use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inbound authentication request as the registry forwards it: the npm login
/// payload wrapped in a `body` field.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticateRequest {
    pub body: Option<CredentialsBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsBody {
    pub name: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
}

/// Inbound authorization request: the package path, the request method the
/// registry is serving, the publish body when present, and the bearer token.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    pub path: Option<String>,
    pub method: Option<String>,
    pub body: Option<PackageManifest>,
    pub headers: Option<RequestHeaders>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestHeaders {
    pub authorization: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationScope {
    Read,
    Publish,
}

impl AuthorizationScope {
    /// GET is a read; everything else is treated as a publish.
    pub fn from_method(method: Option<&str>) -> Self {
        match method {
            Some("GET") => Self::Read,
            _ => Self::Publish,
        }
    }
}

/// The subset of a package manifest needed to locate its backing repository.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: DistTags,
    #[serde(default)]
    pub versions: HashMap<String, VersionDescriptor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistTags {
    pub latest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VersionDescriptor {
    pub name: Option<String>,
    pub version: Option<String>,
    pub repository: Option<RepositoryInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
}

/// Canonical user record returned by the Stash user endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub name: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "emailAddress")]
    pub email_address: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionLevel {
    RepoRead,
    RepoWrite,
    RepoAdmin,
}

impl PermissionLevel {
    /// Levels that satisfy a publish. Membership is an explicit set check,
    /// not an ordinal "at least" comparison.
    pub const PUBLISH: &'static [PermissionLevel] = &[Self::RepoWrite, Self::RepoAdmin];
    /// Levels that satisfy a repository-permission read.
    pub const READ: &'static [PermissionLevel] =
        &[Self::RepoRead, Self::RepoWrite, Self::RepoAdmin];

    pub fn as_api_str(self) -> &'static str {
        match self {
            Self::RepoRead => "REPO_READ",
            Self::RepoWrite => "REPO_WRITE",
            Self::RepoAdmin => "REPO_ADMIN",
        }
    }
}

/// One page of grants from `<repo>/permissions/users`.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionPage {
    #[serde(default)]
    pub values: Vec<PermissionGrant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionGrant {
    pub user: PermissionUser,
    pub permission: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionUser {
    pub name: String,
    #[serde(default)]
    pub active: bool,
}

/// Successful login response handed back to the registry.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedSession {
    pub token: String,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub username: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
