//! Decides whether an image reference is a migration candidate ("public"),
//! already private, or explicitly ignored, via a layered ruleset: ignore
//! list, then private overrides, then public overrides, then a fixed set of
//! registry heuristics, with "public" as the default.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Matched an ignore prefix: not a migration candidate, regardless of
    /// what the heuristics would otherwise conclude.
    Ignored,
    Private,
    Public,
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    ignore_registries: Vec<String>,
    private_registries: Vec<String>,
    public_registries: Vec<String>,
}

impl Classifier {
    pub fn new(ignore_registries: Vec<String>, private_registries: Vec<String>, public_registries: Vec<String>) -> Self {
        Self {
            ignore_registries,
            private_registries,
            public_registries,
        }
    }

    pub fn classify(&self, image: &str) -> Classification {
        let lower = image.to_lowercase();

        if matches_any_prefix(&lower, &self.ignore_registries) {
            return Classification::Ignored;
        }

        // Private wins on overlap with public, so check it first
        // regardless of configuration order.
        if matches_any_prefix(&lower, &self.private_registries) {
            return Classification::Private;
        }

        if matches_any_prefix(&lower, &self.public_registries) {
            return Classification::Public;
        }

        if is_private_by_heuristic(&lower) {
            return Classification::Private;
        }

        Classification::Public
    }
}

fn matches_any_prefix(image: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| image.starts_with(&prefix.to_lowercase()))
}

fn is_private_by_heuristic(image: &str) -> bool {
    is_ecr(image) || is_acr(image) || is_gcr_or_ar(image) || is_ghcr_repo(image) || has_dotted_first_segment(image)
}

fn is_ecr(image: &str) -> bool {
    if image.starts_with("public.ecr.aws") {
        return false;
    }
    image.contains(".dkr.ecr.") && image.contains(".amazonaws.com")
}

fn is_acr(image: &str) -> bool {
    if image.starts_with("mcr.microsoft.com") {
        return false;
    }
    image.contains(".azurecr.io")
}

fn is_gcr_or_ar(image: &str) -> bool {
    const EXCEPTIONS: [&str; 3] = ["gcr.io/google-containers", "k8s.gcr.io", "registry.k8s.io"];
    if EXCEPTIONS.iter().any(|exception| image.starts_with(exception)) {
        return false;
    }
    image.contains(".gcr.io") || image.starts_with("gcr.io") || image.contains(".pkg.dev")
}

fn is_ghcr_repo(image: &str) -> bool {
    if let Some(rest) = image.strip_prefix("ghcr.io/") {
        return rest.split('/').filter(|s| !s.is_empty()).count() >= 2;
    }
    false
}

/// A handful of well-known short aliases that live under Docker Hub despite
/// technically containing a dot, so they must not trip the generic
/// first-segment heuristic below.
const DOCKER_HUB_DOTTED_ALIASES: [&str; 1] = ["docker.io"];

fn has_dotted_first_segment(image: &str) -> bool {
    let first_segment = image.split('/').next().unwrap_or(image);
    if DOCKER_HUB_DOTTED_ALIASES.contains(&first_segment) {
        return false;
    }
    first_segment.contains('.') && image.contains('/')
}

#[cfg(test)]
mod test {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::default()
    }

    #[test]
    fn docker_hub_image_is_public() {
        assert_eq!(classifier().classify("nginx:1.25.3"), Classification::Public);
    }

    #[test]
    fn ecr_private_repo_is_private() {
        assert_eq!(
            classifier().classify("123456789012.dkr.ecr.us-east-1.amazonaws.com/app:latest"),
            Classification::Private
        );
    }

    #[test]
    fn ecr_public_gallery_is_not_caught_by_ecr_heuristic() {
        assert_eq!(classifier().classify("public.ecr.aws/r3m4q3r9/app:latest"), Classification::Public);
    }

    #[test]
    fn acr_is_private_except_mcr_mirror() {
        assert_eq!(classifier().classify("myregistry.azurecr.io/app:latest"), Classification::Private);
        assert_eq!(classifier().classify("mcr.microsoft.com/dotnet/runtime:8.0"), Classification::Public);
    }

    #[test]
    fn gcr_exceptions_stay_public() {
        assert_eq!(classifier().classify("k8s.gcr.io/pause:3.9"), Classification::Public);
        assert_eq!(classifier().classify("registry.k8s.io/pause:3.9"), Classification::Public);
        assert_eq!(classifier().classify("gcr.io/google-containers/pause:3.2"), Classification::Public);
        assert_eq!(classifier().classify("eu.gcr.io/my-project/app:latest"), Classification::Private);
    }

    #[test]
    fn ghcr_with_owner_and_repo_is_private() {
        assert_eq!(classifier().classify("ghcr.io/acme/app:latest"), Classification::Private);
        // Only the org name, no repo: falls through to public.
        assert_eq!(classifier().classify("ghcr.io/acme"), Classification::Public);
    }

    #[test]
    fn ignore_overrides_everything() {
        let c = Classifier::new(vec!["ghcr.io/acme".to_string()], vec![], vec![]);
        assert_eq!(c.classify("ghcr.io/acme/app:latest"), Classification::Ignored);
    }

    #[test]
    fn private_override_wins_over_public_override_on_overlap() {
        let c = Classifier::new(vec![], vec!["registry.example.com".to_string()], vec!["registry.example.com".to_string()]);
        assert_eq!(c.classify("registry.example.com/app:1.0"), Classification::Private);
    }

    #[test]
    fn custom_public_registry_overrides_heuristic() {
        let c = Classifier::new(vec![], vec![], vec!["ghcr.io/acme".to_string()]);
        assert_eq!(c.classify("ghcr.io/acme/app:latest"), Classification::Public);
    }
}
