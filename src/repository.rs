use crate::{error::AuthError, models::VersionDescriptor};
use tracing::warn;
use url::Url;

/// Repository coordinates derived from a package's declared repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReference {
    pub path: String,
    pub host: String,
}

/// Derives the Stash API path for the package's backing repository and checks
/// that it lives on the configured Stash host. Runs before any network call;
/// a non-git repository or a foreign host is a hard rejection.
pub fn resolve(
    descriptor: &VersionDescriptor,
    api_url: &Url,
) -> Result<RepositoryReference, AuthError> {
    let Some(repository) = descriptor.repository.as_ref() else {
        warn!("package descriptor has no repository, rejecting");
        return Err(AuthError::UnsupportedRepositoryType);
    };
    if repository.kind.as_deref() != Some("git") {
        warn!(
            repository_type = repository.kind.as_deref().unwrap_or("<none>"),
            "repository type is not 'git', rejecting"
        );
        return Err(AuthError::UnsupportedRepositoryType);
    }

    let raw_url = repository.url.as_deref().ok_or_else(|| {
        AuthError::Validation("package repository has no url".to_string())
    })?;
    let repo_url = Url::parse(raw_url)
        .map_err(|err| AuthError::Validation(format!("invalid repository url {raw_url}: {err}")))?;

    let configured = api_url.host_str().unwrap_or_default().to_string();
    let requested = repo_url.host_str().unwrap_or_default().to_string();
    if configured != requested {
        warn!(
            configured = configured.as_str(),
            requested = requested.as_str(),
            "repository host mismatch, rejecting authorization"
        );
        return Err(AuthError::HostMismatch {
            configured,
            requested,
        });
    }

    let path = repo_url
        .path()
        .strip_suffix(".git")
        .unwrap_or(repo_url.path())
        .to_string();
    Ok(RepositoryReference {
        path,
        host: requested,
    })
}
