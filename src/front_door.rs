use crate::{config::FrontDoorConfig, error::AuthError, models::PackageManifest};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info};

/// Client for the front door service that can return the descriptor of an
/// earlier publish.
#[derive(Debug, Clone)]
pub struct FrontDoor {
    base_url: String,
    shared_fetch_secret: String,
    http: Client,
}

impl FrontDoor {
    pub fn new(cfg: &FrontDoorConfig) -> Result<Self, AuthError> {
        let base_url = cfg.host.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AuthError::Validation(
                "front door host is required".to_string(),
            ));
        }

        let timeout = Duration::from_millis(cfg.http_timeout_ms.max(250));
        let connect_timeout = timeout.min(Duration::from_secs(3));
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(15))
            .build()
            .map_err(|_| AuthError::Internal)?;

        Ok(Self {
            base_url,
            shared_fetch_secret: cfg.shared_fetch_secret.clone(),
            http,
        })
    }

    /// Fetches the package descriptor of record. A 404 is the expected
    /// first-publish case and maps to `None`.
    pub async fn fetch_descriptor(&self, path: &str) -> Result<Option<PackageManifest>, AuthError> {
        let package_path = path.split('?').next().unwrap_or(path);
        debug!(package_path, "loading package descriptor from front door");

        let url = format!("{}{}", self.base_url, package_path);
        let response = self
            .http
            .get(url)
            .query(&[("sharedFetchSecret", self.shared_fetch_secret.as_str())])
            .send()
            .await
            .map_err(|err| {
                error!(package_path, error = %err, "front door request failed");
                AuthError::Network(err.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(package_path, "no earlier publish found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AuthError::FrontDoor(format!(
                "invalid response from front door to query for package {package_path}: {}",
                status.as_u16()
            )));
        }

        let manifest = response.json::<PackageManifest>().await.map_err(|err| {
            AuthError::FrontDoor(format!("bad front door payload for {package_path}: {err}"))
        })?;
        info!(
            package = manifest.id.as_deref().unwrap_or("<unknown>"),
            "found existing package descriptor from earlier publish"
        );
        Ok(Some(manifest))
    }
}
