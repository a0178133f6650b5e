//! AWS Elastic Container Registry adapter, built on the official
//! `aws-sdk-ecr` + `aws-config` crates (see DESIGN.md for why this adapter
//! doesn't use a `rusoto`-family fork instead). `get_authorization_token`/
//! `describe_repositories`/`create_repository`/`batch_get_image` calls are
//! async; each is bridged through `crate::runtime::block_on`.

use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_ecr::Client as EcrClient;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use retry::OperationResult;
use retry::delay::Fixed;
use tracing::{info, warn};

use crate::cmd::command::CancellationToken;
use crate::cmd::docker::{ContainerImage, Docker};
use crate::registry::errors::RegistryError;
use crate::registry::{RegistryAdapter, RegistryConfig, RegistryKind};
use crate::runtime::block_on;

pub struct EcrAdapter {
    config: RegistryConfig,
    client: EcrClient,
    docker: Docker,
}

impl EcrAdapter {
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let region = config.region.clone().ok_or_else(|| RegistryError::CannotInstantiateClient {
            registry_name: config.name.clone(),
            raw_error_message: "ecr registries require a region".to_string(),
        })?;

        let sdk_config = block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(aws_sdk_ecr::config::Region::new(region))
                .load(),
        );
        let client = EcrClient::new(&sdk_config);

        Ok(Self {
            config,
            client,
            docker: Docker::new(),
        })
    }

    fn host(&self) -> Option<String> {
        let account_id = self.config.account_id.as_deref()?;
        let region = self.config.region.as_deref()?;
        Some(format!("{account_id}.dkr.ecr.{region}.amazonaws.com"))
    }

    /// Exchanges AWS credentials for a short-lived basic-auth token and
    /// feeds it to the local docker daemon.
    fn authenticate_docker_daemon(&self) -> Result<(), RegistryError> {
        let Some(host) = self.host() else {
            return Err(RegistryError::CannotInstantiateClient {
                registry_name: self.name().to_string(),
                raw_error_message: "ecr registries require both account_id and region".to_string(),
            });
        };

        let response = block_on(self.client.get_authorization_token().send()).map_err(|err| {
            RegistryError::RegistryUnavailable {
                registry_name: self.name().to_string(),
                raw_error_message: err.to_string(),
            }
        })?;

        let token = response
            .authorization_data()
            .first()
            .and_then(|data| data.authorization_token())
            .ok_or_else(|| RegistryError::AuthRequired {
                registry_name: self.name().to_string(),
            })?;

        let decoded = BASE64.decode(token).map_err(|err| RegistryError::AuthRequired {
            registry_name: format!("{}: malformed authorization token ({err})", self.name()),
        })?;
        let decoded = String::from_utf8(decoded).map_err(|_| RegistryError::AuthRequired {
            registry_name: self.name().to_string(),
        })?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| RegistryError::AuthRequired {
            registry_name: self.name().to_string(),
        })?;

        self.docker.login(&host, username, password)?;
        Ok(())
    }

    /// Creates the repository on first push to this account. Ignores the
    /// "already exists" error, treating it as success rather than failure.
    fn ensure_repository_exists(&self, repository_name: &str) -> Result<(), RegistryError> {
        let describe = block_on(
            self.client
                .describe_repositories()
                .repository_names(repository_name)
                .send(),
        );

        if describe.is_ok() {
            return Ok(());
        }

        let result = retry::retry(Fixed::from_millis(500).take(3), || {
            match block_on(self.client.create_repository().repository_name(repository_name).send()) {
                Ok(_) => OperationResult::Ok(()),
                Err(err) if err.to_string().contains("RepositoryAlreadyExistsException") => OperationResult::Ok(()),
                Err(err) => {
                    warn!(repository_name, error = %err, "retrying ecr repository creation");
                    OperationResult::Retry(err)
                }
            }
        });

        result.map_err(|err| RegistryError::CannotCreateRepository {
            registry_name: self.name().to_string(),
            repository_name: repository_name.to_string(),
            raw_error_message: err.error.to_string(),
        })
    }

    fn repository_and_tag(target_image: &str) -> Option<(&str, &str)> {
        let (host_and_repo, tag) = target_image.rsplit_once(':')?;
        let (_, repo) = host_and_repo.split_once('/')?;
        Some((repo, tag))
    }
}

impl RegistryAdapter for EcrAdapter {
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
        self.authenticate_docker_daemon()
    }

    fn copy(&self, source: &str, target: &str, cancellation: &CancellationToken) -> Result<(), RegistryError> {
        if let Some((repository_name, _tag)) = Self::repository_and_tag(target) {
            self.ensure_repository_exists(repository_name)?;
        }

        info!(source, target, registry = self.name(), "copying image");
        let source = ContainerImage::new(source.to_string());
        let target = ContainerImage::new(target.to_string());
        self.docker.copy(&source, &target, cancellation)?;
        Ok(())
    }

    fn has_image(&self, target_image: &str) -> Result<bool, RegistryError> {
        let Some((repository_name, tag)) = Self::repository_and_tag(target_image) else {
            return Ok(false);
        };

        let response = block_on(
            self.client
                .batch_get_image()
                .repository_name(repository_name)
                .image_ids(aws_sdk_ecr::types::ImageIdentifier::builder().image_tag(tag).build())
                .send(),
        );

        match response {
            Ok(output) => Ok(!output.images().is_empty()),
            Err(err) if err.to_string().contains("RepositoryNotFoundException") => Ok(false),
            Err(err) => Err(RegistryError::RegistryUnavailable {
                registry_name: self.name().to_string(),
                raw_error_message: err.to_string(),
            }),
        }
    }

    fn health_check(&self) -> Result<(), RegistryError> {
        block_on(async {
            tokio::time::timeout(Duration::from_secs(10), self.client.describe_repositories().send()).await
        })
        .map_err(|_| RegistryError::RegistryUnavailable {
            registry_name: self.name().to_string(),
            raw_error_message: "timed out".to_string(),
        })?
        .map_err(|err| RegistryError::RegistryUnavailable {
            registry_name: self.name().to_string(),
            raw_error_message: err.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn repository_and_tag_splits_account_scoped_reference() {
        let (repo, tag) =
            EcrAdapter::repository_and_tag("123456789012.dkr.ecr.us-east-1.amazonaws.com/library/nginx:1.25.3").unwrap();
        assert_eq!(repo, "library/nginx");
        assert_eq!(tag, "1.25.3");
    }
}
