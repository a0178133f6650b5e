//! Adapter for any registry that speaks the plain OCI/Docker Registry v2
//! HTTP API: a self-hosted Docker registry, Harbor, or any other
//! project-scoped registry. `RegistryConfig.kind` distinguishes `Generic`
//! from `ProjectScoped` only for target-name generation; the wire protocol
//! and adapter behavior are identical either way.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::info;

use crate::cmd::command::CancellationToken;
use crate::cmd::docker::{ContainerImage, Docker};
use crate::registry::errors::RegistryError;
use crate::registry::{RegistryAdapter, RegistryConfig, RegistryKind};

pub struct GenericRegistryAdapter {
    config: RegistryConfig,
    docker: Docker,
    http_client: reqwest::blocking::Client,
}

impl GenericRegistryAdapter {
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http_client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(config.insecure)
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

    fn base_url(&self) -> String {
        let url = self.config.url.as_deref().unwrap_or("");
        let scheme = if self.config.insecure { "http" } else { "https" };
        let host = url.trim_start_matches("https://").trim_start_matches("http://");
        format!("{scheme}://{host}")
    }

    /// `target_image` is `host/repo:tag`; splits it back into
    /// `repo`/`tag` for a manifest HEAD request against this registry's
    /// own host.
    fn split_repo_and_tag(target_image: &str) -> Option<(&str, &str)> {
        let (host_and_repo, tag) = target_image.rsplit_once(':')?;
        let (_, repo) = host_and_repo.split_once('/')?;
        Some((repo, tag))
    }
}

impl RegistryAdapter for GenericRegistryAdapter {
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
        let (Some(username), Some(password)) = (self.config.username.as_deref(), self.config.password.as_deref())
        else {
            return Ok(());
        };
        let host = self.config.url.as_deref().unwrap_or_default();
        self.docker.login(host, username, password)?;
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
        let Some((repo, tag)) = Self::split_repo_and_tag(target_image) else {
            return Ok(false);
        };

        let url = format!("{}/v2/{}/manifests/{}", self.base_url(), repo, tag);
        let response = self
            .http_client
            .head(&url)
            .header("Accept", "application/vnd.docker.distribution.manifest.v2+json")
            .send()
            .map_err(|err| RegistryError::RegistryUnavailable {
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
        let url = format!("{}/v2/", self.base_url());
        let response = self.http_client.get(&url).send().map_err(|err| RegistryError::RegistryUnavailable {
            registry_name: self.name().to_string(),
            raw_error_message: err.to_string(),
        })?;

        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
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

    #[test]
    fn split_repo_and_tag_handles_nested_repository_paths() {
        let (repo, tag) = GenericRegistryAdapter::split_repo_and_tag("registry.example.com/library/nginx:1.25.3").unwrap();
        assert_eq!(repo, "library/nginx");
        assert_eq!(tag, "1.25.3");
    }
}
