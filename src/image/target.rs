use thiserror::Error;

use crate::image::ImageReference;
use crate::registry::{RegistryConfig, RegistryKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetGenerationError {
    #[error("target generation for registry `{registry_name}` (kind {kind:?}) produced an empty reference")]
    EmptyResult { registry_name: String, kind: RegistryKind },
    #[error("ecr target requires an account id for registry `{registry_name}`")]
    MissingAccountId { registry_name: String },
    #[error("ecr target requires a region for registry `{registry_name}`")]
    MissingRegion { registry_name: String },
}

/// Builds the private-registry reference a public image should land at.
/// The upstream namespace path is preserved in full so that
/// `mycorp/app` and `library/app` never collide once copied privately.
pub fn generate_target_name(image: &ImageReference, cfg: &RegistryConfig) -> Result<String, TargetGenerationError> {
    let target_repo = image.full_repository();
    let target_tag = image.tag_with_digest();

    let rendered = match cfg.kind {
        RegistryKind::Generic => {
            format!("{}/{}:{}", normalize_url(cfg.url.as_deref().unwrap_or("")), target_repo, target_tag)
        }
        RegistryKind::ProjectScoped => {
            let project = cfg.project.as_deref().unwrap_or("library");
            format!(
                "{}/{}/{}:{}",
                normalize_url(cfg.url.as_deref().unwrap_or("")),
                project,
                target_repo,
                target_tag
            )
        }
        RegistryKind::CloudHosted => {
            let account_id = cfg.account_id.as_deref().ok_or_else(|| TargetGenerationError::MissingAccountId {
                registry_name: cfg.name.clone(),
            })?;
            let region = cfg.region.as_deref().ok_or_else(|| TargetGenerationError::MissingRegion {
                registry_name: cfg.name.clone(),
            })?;
            format!("{account_id}.dkr.ecr.{region}.amazonaws.com/{target_repo}:{target_tag}")
        }
        RegistryKind::OrgScoped => {
            let org = cfg
                .project
                .as_deref()
                .or(cfg.org_or_user.as_deref())
                .unwrap_or("unknown");
            format!("ghcr.io/{org}/{target_repo}:{target_tag}")
        }
    };

    if rendered.is_empty() {
        return Err(TargetGenerationError::EmptyResult {
            registry_name: cfg.name.clone(),
            kind: cfg.kind,
        });
    }

    Ok(rendered)
}

fn normalize_url(url: &str) -> &str {
    url.trim_start_matches("https://").trim_start_matches("http://")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::RegistryConfig;

    fn generic_cfg(name: &str, url: &str) -> RegistryConfig {
        RegistryConfig {
            name: name.to_string(),
            kind: RegistryKind::Generic,
            enabled: true,
            priority: 0,
            url: Some(url.to_string()),
            username: None,
            password: None,
            insecure: false,
            project: None,
            region: None,
            account_id: None,
            org_or_user: None,
        }
    }

    #[test]
    fn docker_hub_normalization_to_generic_target() {
        let image = ImageReference::parse("nginx:1.25.3").unwrap();
        let cfg = generic_cfg("mirror", "registry.example.com");
        let target = generate_target_name(&image, &cfg).unwrap();
        assert_eq!(target, "registry.example.com/library/nginx:1.25.3");
    }

    #[test]
    fn ecr_target_preserves_digest() {
        let image = ImageReference::parse("alpine:3.19@sha256:abcd").unwrap();
        let cfg = RegistryConfig {
            kind: RegistryKind::CloudHosted,
            account_id: Some("123456789012".to_string()),
            region: Some("us-east-1".to_string()),
            ..generic_cfg("ecr", "")
        };
        let target = generate_target_name(&image, &cfg).unwrap();
        assert_eq!(target, "123456789012.dkr.ecr.us-east-1.amazonaws.com/library/alpine:3.19@sha256:abcd");
    }

    #[test]
    fn project_scoped_defaults_project_to_library() {
        let image = ImageReference::parse("bitnami/redis:7.2.4").unwrap();
        let cfg = generic_cfg("harbor", "harbor.example.com");
        let cfg = RegistryConfig {
            kind: RegistryKind::ProjectScoped,
            ..cfg
        };
        let target = generate_target_name(&image, &cfg).unwrap();
        assert_eq!(target, "harbor.example.com/library/bitnami/redis:7.2.4");
    }

    #[test]
    fn org_scoped_ghcr_uses_project_then_user_then_unknown() {
        let image = ImageReference::parse("bitnami/redis:7.2.4").unwrap();
        let mut cfg = RegistryConfig {
            kind: RegistryKind::OrgScoped,
            ..generic_cfg("ghcr", "")
        };
        cfg.project = Some("my-org".to_string());
        let target = generate_target_name(&image, &cfg).unwrap();
        assert_eq!(target, "ghcr.io/my-org/bitnami/redis:7.2.4");
    }

    #[test]
    fn ecr_without_account_id_fails() {
        let image = ImageReference::parse("nginx:latest").unwrap();
        let cfg = RegistryConfig {
            kind: RegistryKind::CloudHosted,
            region: Some("us-east-1".to_string()),
            ..generic_cfg("ecr", "")
        };
        assert!(matches!(
            generate_target_name(&image, &cfg),
            Err(TargetGenerationError::MissingAccountId { .. })
        ));
    }
}
