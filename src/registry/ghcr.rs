//! Adapter for the GitHub Container Registry. Wire protocol is plain OCI
//! v2 like `generic`, but repositories live under an org/user namespace and
//! existence checks use the GitHub REST API (package visibility/versions)
//! rather than the raw v2 manifest endpoint, since a GHCR personal access
//! token frequently lacks `read:packages` scope against the registry
//! endpoint directly without first authenticating through `docker login`.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::info;

use crate::cmd::command::CancellationToken;
use crate::cmd::docker::{ContainerImage, Docker};
use crate::registry::errors::RegistryError;
use crate::registry::{RegistryAdapter, RegistryConfig, RegistryKind};

const GITHUB_API_BASE: &str = "https://api.github.com";

pub struct GhcrAdapter {
    config: RegistryConfig,
    docker: Docker,
    http_client: reqwest::blocking::Client,
}

impl GhcrAdapter {
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http_client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent("privateer")
            .build()
            .map_err(|err| RegistryError::CannotInstantiateClient {
                registry_name: config.name.clone(),
                raw_error_message: err.to_string(),
            })?;

        Ok(Self {
            config,
            docker: Docker::new(),
            http_client,
        })
    }

    fn org_or_user(&self) -> &str {
        self.config
            .project
            .as_deref()
            .or(self.config.org_or_user.as_deref())
            .unwrap_or("")
    }

    fn token(&self) -> Option<&str> {
        self.config.password.as_deref()
    }

    /// `target_image` is `ghcr.io/org/path...:tag`; GHCR's package API
    /// addresses a package by its dot-free repository path with the
    /// leading `ghcr.io/org/` stripped.
    fn package_name(&self, target_image: &str) -> Option<String> {
        let without_registry = target_image.strip_prefix("ghcr.io/")?;
        let without_org = without_registry.strip_prefix(self.org_or_user())?.trim_start_matches('/');
        let (path, _tag) = without_org.rsplit_once(':')?;
        Some(path.to_string())
    }
}

impl RegistryAdapter for GhcrAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> RegistryKind {
        self.config.kind
    }

    fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn login(&self, _cancellation: &CancellationToken) -> Result<(), RegistryError> {
        let (Some(username), Some(token)) = (self.config.username.as_deref(), self.token()) else {
            return Ok(());
        };
        self.docker.login("ghcr.io", username, token)?;
        Ok(())
    }

    fn copy(&self, source: &str, target: &str, cancellation: &CancellationToken) -> Result<(), RegistryError> {
        info!(source, target, registry = self.name(), "copying image");
        let source = ContainerImage::new(source.to_string());
        let target = ContainerImage::new(target.to_string());
        self.docker.copy(&source, &target, cancellation)?;
        Ok(())
    }

    fn has_image(&self, target_image: &str) -> Result<bool, RegistryError> {
        let Some(package) = self.package_name(target_image) else {
            return Ok(false);
        };
        let encoded_package = package.replace('/', "%2F");
        let url = format!(
            "{}/orgs/{}/packages/container/{}/versions",
            GITHUB_API_BASE,
            self.org_or_user(),
            encoded_package
        );

        let mut request = self.http_client.get(&url).header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|err| RegistryError::RegistryUnavailable {
            registry_name: self.name().to_string(),
            raw_error_message: err.to_string(),
        })?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RegistryError::AuthRequired {
                registry_name: self.name().to_string(),
            }),
            other => Err(RegistryError::RegistryUnavailable {
                registry_name: self.name().to_string(),
                raw_error_message: format!("unexpected status {other}"),
            }),
        }
    }

    fn health_check(&self) -> Result<(), RegistryError> {
        let mut request = self.http_client.get(format!("{GITHUB_API_BASE}/rate_limit"));
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|err| RegistryError::RegistryUnavailable {
            registry_name: self.name().to_string(),
            raw_error_message: err.to_string(),
        })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RegistryError::RegistryUnavailable {
                registry_name: self.name().to_string(),
                raw_error_message: format!("unexpected status {}", response.status()),
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn adapter() -> GhcrAdapter {
        let config = RegistryConfig {
            name: "ghcr".to_string(),
            kind: RegistryKind::OrgScoped,
            enabled: true,
            priority: 0,
            url: None,
            username: Some("bot".to_string()),
            password: Some("token".to_string()),
            insecure: false,
            project: Some("acme".to_string()),
            region: None,
            account_id: None,
            org_or_user: None,
        };
        GhcrAdapter::new(config).unwrap()
    }

    #[test]
    fn package_name_strips_org_and_tag() {
        let adapter = adapter();
        assert_eq!(
            adapter.package_name("ghcr.io/acme/bitnami/redis:7.2.4"),
            Some("bitnami/redis".to_string())
        );
    }

    #[test]
    fn package_name_rejects_foreign_registry() {
        let adapter = adapter();
        assert_eq!(adapter.package_name("docker.io/library/nginx:latest"), None);
    }
}
