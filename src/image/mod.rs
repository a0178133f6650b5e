pub mod classifier;
pub mod target;

use std::fmt;

use thiserror::Error;

pub use classifier::{Classification, Classifier};
pub use target::{generate_target_name, TargetGenerationError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageParseError {
    #[error("image reference `{0}` is empty")]
    Empty(String),
}

/// A parsed, canonical image reference: `[registry/][namespace/]repository[:tag][@digest]`.
///
/// Immutable once constructed; every field reflects a fixed set of
/// normalization rules (missing registry defaults to `docker.io`, missing
/// namespace defaults to `library`, missing tag defaults to `latest`, and
/// the three Docker Hub mirror hostnames collapse to one).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub original: String,
    pub registry: String,
    pub namespace: String,
    pub repository: String,
    pub tag: String,
    pub digest: Option<String>,
}

const DOCKER_HUB: &str = "docker.io";
const DOCKER_HUB_ALIASES: [&str; 2] = ["index.docker.io", "registry-1.docker.io"];

impl ImageReference {
    pub fn parse(s: &str) -> Result<Self, ImageParseError> {
        let original = s.trim().to_string();
        if original.is_empty() {
            return Err(ImageParseError::Empty(s.to_string()));
        }

        let (head, digest) = match original.split_once('@') {
            Some((head, digest)) => (head, Some(digest.to_string())),
            None => (original.as_str(), None),
        };

        let (path, tag) = split_tag(head);

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (registry, namespace, repository) = match segments.len() {
            0 => (DOCKER_HUB.to_string(), "library".to_string(), String::new()),
            1 => (DOCKER_HUB.to_string(), "library".to_string(), segments[0].to_string()),
            2 => {
                if segments[0].contains('.') || segments[0].contains(':') {
                    (normalize_registry(segments[0]), String::new(), segments[1].to_string())
                } else {
                    (DOCKER_HUB.to_string(), segments[0].to_string(), segments[1].to_string())
                }
            }
            3 => (
                normalize_registry(segments[0]),
                segments[1].to_string(),
                segments[2].to_string(),
            ),
            _ => (
                normalize_registry(segments[0]),
                segments[1..segments.len() - 1].join("/"),
                segments[segments.len() - 1].to_string(),
            ),
        };

        Ok(ImageReference {
            original,
            registry,
            namespace,
            repository,
            tag: tag.unwrap_or_else(|| "latest".to_string()),
            digest,
        })
    }

    /// `namespace/repository`, unless the registry isn't Docker Hub and the
    /// namespace is empty (a bare `registry.example.com/repo` reference),
    /// in which case just `repository`.
    pub fn full_repository(&self) -> String {
        if self.namespace.is_empty() {
            self.repository.clone()
        } else {
            format!("{}/{}", self.namespace, self.repository)
        }
    }

    /// `tag@digest` if a digest is present, else just `tag`.
    pub fn tag_with_digest(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.tag, digest),
            None => self.tag.clone(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.full_repository(), self.tag_with_digest())
    }
}

fn normalize_registry(registry: &str) -> String {
    if DOCKER_HUB_ALIASES.contains(&registry) {
        DOCKER_HUB.to_string()
    } else {
        registry.to_string()
    }
}

/// Splits off a trailing `:tag`, but only if the colon sits after the last
/// `/` — otherwise it's a port number on a registry host, not a tag.
fn split_tag(head: &str) -> (&str, Option<String>) {
    match head.rfind(':') {
        Some(colon_pos) => {
            let slash_pos = head.rfind('/');
            if slash_pos.is_none_or(|slash| colon_pos > slash) {
                (&head[..colon_pos], Some(head[colon_pos + 1..].to_string()))
            } else {
                (head, None)
            }
        }
        None => (head, None),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_segment_defaults_to_docker_hub_library() {
        let img = ImageReference::parse("nginx").unwrap();
        assert_eq!(img.registry, "docker.io");
        assert_eq!(img.namespace, "library");
        assert_eq!(img.repository, "nginx");
        assert_eq!(img.tag, "latest");
    }

    #[test]
    fn two_segments_without_dot_is_namespace_repo() {
        let img = ImageReference::parse("bitnami/redis:7.2.4").unwrap();
        assert_eq!(img.registry, "docker.io");
        assert_eq!(img.namespace, "bitnami");
        assert_eq!(img.repository, "redis");
        assert_eq!(img.tag, "7.2.4");
    }

    #[test]
    fn two_segments_with_dot_is_registry_repo() {
        let img = ImageReference::parse("registry.example.com/app:1.0").unwrap();
        assert_eq!(img.registry, "registry.example.com");
        assert_eq!(img.namespace, "");
        assert_eq!(img.repository, "app");
        assert_eq!(img.full_repository(), "app");
    }

    #[test]
    fn port_in_registry_host_is_not_confused_with_tag() {
        let img = ImageReference::parse("registry.example.com:5000/app").unwrap();
        assert_eq!(img.registry, "registry.example.com:5000");
        assert_eq!(img.repository, "app");
        assert_eq!(img.tag, "latest");
    }

    #[test]
    fn four_or_more_segments_joins_the_middle_as_namespace() {
        let img = ImageReference::parse("ghcr.io/my-org/sub-team/service:v1").unwrap();
        assert_eq!(img.registry, "ghcr.io");
        assert_eq!(img.namespace, "my-org/sub-team");
        assert_eq!(img.repository, "service");
        assert_eq!(img.full_repository(), "my-org/sub-team/service");
    }

    #[test]
    fn docker_hub_mirror_hosts_normalize() {
        for host in ["index.docker.io", "registry-1.docker.io", "docker.io"] {
            let img = ImageReference::parse(&format!("{host}/library/nginx:latest")).unwrap();
            assert_eq!(img.registry, "docker.io");
        }
    }

    #[test]
    fn digest_is_preserved_separately_from_tag() {
        let img = ImageReference::parse("alpine:3.19@sha256:abcd").unwrap();
        assert_eq!(img.tag, "3.19");
        assert_eq!(img.digest.as_deref(), Some("sha256:abcd"));
        assert_eq!(img.tag_with_digest(), "3.19@sha256:abcd");
    }

    #[test]
    fn round_trips_through_display_and_parse() {
        for raw in [
            "nginx:1.25.3",
            "bitnami/redis:7.2.4",
            "registry.example.com/app:1.0",
            "ghcr.io/my-org/sub-team/service:v1",
            "alpine:3.19@sha256:abcd",
        ] {
            let parsed = ImageReference::parse(raw).unwrap();
            let rendered = parsed.to_string();
            let reparsed = ImageReference::parse(&rendered).unwrap();
            assert_eq!(parsed.registry, reparsed.registry);
            assert_eq!(parsed.full_repository(), reparsed.full_repository());
            assert_eq!(parsed.tag, reparsed.tag);
            assert_eq!(parsed.digest, reparsed.digest);
        }
    }
}
