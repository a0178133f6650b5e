//! Rewrites validated source image references in place: textual surgery
//! rather than a full YAML AST round-trip, so that author
//! formatting, comments and unrelated lines survive untouched. Each file
//! kind gets its own anchored pattern; a replacement that doesn't fire is
//! reported, never silently dropped.

use regex::{Captures, Regex};

use crate::gitops::errors::GitOpsError;
use crate::gitops::scanner::{DetectionResult, FileKind};
use crate::image::ImageReference;

/// A concrete rewrite instruction: a validated source reference at a known
/// file/line, and the private target it should become. Only ever built
/// from a `DetectionResult` joined against a proven `public -> private`
/// mapping — never constructed speculatively.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub source_image: String,
    pub source_registry: String,
    pub source_repository: String,
    pub source_tag: String,
    pub target_image: String,
    pub file_kind: FileKind,
    pub file_path: String,
    pub line_number: usize,
    pub context: String,
}

impl Replacement {
    pub fn from_detection(detection: &DetectionResult, target_image: String) -> Self {
        Self {
            source_image: detection.full_image.clone(),
            source_registry: detection.registry.clone(),
            source_repository: detection.repository.clone(),
            source_tag: detection.tag.clone(),
            target_image,
            file_kind: detection.file_kind,
            file_path: detection.file_path.clone(),
            line_number: detection.line_number,
            context: detection.context.clone(),
        }
    }

    /// `"image:line"`, the dedup/lookup key for a `Replacement`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source_image, self.line_number)
    }
}

/// Applies every replacement targeting this file's content. Returns the
/// new content and the subset of replacements that actually fired; a
/// replacement whose anchor can't be found is simply omitted from that
/// second list rather than treated as an error.
pub fn apply(path: &str, content: &str, replacements: &[Replacement]) -> Result<(String, Vec<Replacement>), GitOpsError> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut fired = Vec::new();

    for replacement in replacements {
        let ok = match replacement.file_kind {
            FileKind::KubernetesManifest | FileKind::GenericYaml | FileKind::ArgocdApplication => {
                rewrite_plain_image_line(&mut lines, replacement)
            }
            FileKind::HelmSeparated => rewrite_helm_separated(&mut lines, replacement),
            FileKind::HelmCombined => rewrite_helm_combined(&mut lines, replacement),
            FileKind::Kustomize => rewrite_kustomize(&mut lines, replacement),
            FileKind::HelmValues => rewrite_plain_image_line(&mut lines, replacement),
        };

        // Fallback: whatever the declared file kind, try the plain
        // `image:` pattern before giving up on this replacement.
        let ok = ok || rewrite_plain_image_line(&mut lines, replacement);

        if ok {
            fired.push(replacement.clone());
        }
    }

    let mut new_content = lines.join("\n");
    if content.ends_with('\n') {
        new_content.push('\n');
    }

    validate_invariants(path, content, &new_content)?;
    Ok((new_content, fired))
}

fn validate_invariants(path: &str, before: &str, after: &str) -> Result<(), GitOpsError> {
    for line in after.lines() {
        if line.trim_start().starts_with(':') {
            return Err(GitOpsError::ContentInvariantViolated {
                path: path.to_string(),
                reason: format!("line starts with a bare colon: `{line}`"),
            });
        }
    }

    if bracket_balance(before) != bracket_balance(after) {
        return Err(GitOpsError::ContentInvariantViolated {
            path: path.to_string(),
            reason: "bracket balance changed by replacement".to_string(),
        });
    }

    Ok(())
}

fn bracket_balance(content: &str) -> (i64, i64) {
    let mut curly = 0i64;
    let mut square = 0i64;
    for ch in content.chars() {
        match ch {
            '{' => curly += 1,
            '}' => curly -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            _ => {}
        }
    }
    (curly, square)
}

/// `(^\s*image:\s*["']?)SRC(["']?\s*$)`, preserving indentation, quote
/// style, and colon form for the kubernetes/generic case.
fn rewrite_plain_image_line(lines: &mut [String], replacement: &Replacement) -> bool {
    let Some(pattern) = anchored_value_pattern("image", &replacement.source_image) else {
        return false;
    };
    replace_first_match(lines, &pattern, &replacement.target_image)
}

fn rewrite_helm_separated(lines: &mut [String], replacement: &Replacement) -> bool {
    let Ok(target) = ImageReference::parse(&replacement.target_image) else {
        return false;
    };
    let target_registry = target.registry.clone();
    let target_tag = target.tag_with_digest();

    let registry_pattern = anchored_value_pattern("registry", &replacement.source_registry);
    let repository_pattern = anchored_value_pattern("repository", &replacement.source_repository);
    let tag_pattern = anchored_value_pattern("tag", &replacement.source_tag);

    // All three fields must be present nearby (within the same block) for
    // this to be a genuine helm_separated hit; the block itself was
    // already identified by the scanner, so here we only need to find the
    // matching lines by value and rewrite them in place.
    let Some(registry_pattern) = registry_pattern else { return false };
    let Some(repository_pattern) = repository_pattern else { return false };
    let Some(tag_pattern) = tag_pattern else { return false };

    if !any_line_matches(lines, &repository_pattern) {
        return false;
    }

    let mut rewrote_registry = replace_first_match(lines, &registry_pattern, &target_registry);
    // `repository:` is left untouched: the upstream namespace path is
    // preserved identically in the private registry.
    let _ = &repository_pattern;

    if replacement.source_tag != target_tag {
        rewrote_registry |= replace_first_match(lines, &tag_pattern, &target_tag);
    }

    rewrote_registry
}

fn rewrite_helm_combined(lines: &mut [String], replacement: &Replacement) -> bool {
    let Ok(target) = ImageReference::parse(&replacement.target_image) else {
        return false;
    };
    let target_tag = target.tag_with_digest();
    let target_combined = if target.registry == "docker.io" {
        target.full_repository()
    } else {
        format!("{}/{}", target.registry, target.full_repository())
    };

    // The raw `repository:` field value is everything before the trailing
    // `:tag` in `source_image` (`"{repository}:{tag}"`, per the scanner's
    // combined-form construction).
    let Some(source_combined_repository) = replacement.source_image.strip_suffix(&format!(":{}", replacement.source_tag))
    else {
        return false;
    };

    let Some(repository_pattern) = anchored_value_pattern("repository", source_combined_repository) else {
        return false;
    };
    let mut rewrote = replace_first_match(lines, &repository_pattern, &target_combined);

    if replacement.source_tag != target_tag {
        if let Some(tag_pattern) = anchored_value_pattern("tag", &replacement.source_tag) {
            rewrote |= replace_first_match(lines, &tag_pattern, &target_tag);
        }
    }

    rewrote
}

fn rewrite_kustomize(lines: &mut [String], replacement: &Replacement) -> bool {
    let Ok(target) = ImageReference::parse(&replacement.target_image) else {
        return false;
    };
    let target_tag = target.tag_with_digest();
    let target_name = format!("{}/{}", target.registry, target.full_repository());

    let Some(new_name_pattern) = anchored_value_pattern("newName", &replacement.source_repository) else {
        return false;
    };
    let mut rewrote = replace_first_match(lines, &new_name_pattern, &target_name);

    if replacement.source_tag != target_tag {
        if let Some(new_tag_pattern) = anchored_value_pattern("newTag", &replacement.source_tag) {
            rewrote |= replace_first_match(lines, &new_tag_pattern, &target_tag);
        }
    }

    rewrote
}

/// Builds `^(\s*{field}:\s*["']?)VALUE(["']?\s*)$` for an exact line value,
/// with `VALUE` escaped so regex metacharacters in tags/digests don't leak
/// through. Returns `None` for an empty value (nothing to anchor on).
fn anchored_value_pattern(field: &str, value: &str) -> Option<Regex> {
    if value.is_empty() {
        return None;
    }
    // `- name:` sequence items start with a dash; both plain and sequence
    // forms are matched by allowing an optional leading `- `.
    let source = format!(r#"^(\s*(?:-\s*)?{field}:\s*["']?){}(["']?\s*)$"#, regex::escape(value));
    Regex::new(&source).ok()
}

fn any_line_matches(lines: &[String], pattern: &Regex) -> bool {
    lines.iter().any(|line| pattern.is_match(line))
}

fn replace_first_match(lines: &mut [String], pattern: &Regex, replacement_value: &str) -> bool {
    for line in lines.iter_mut() {
        if pattern.is_match(line) {
            *line = pattern
                .replace(line, |caps: &Captures| format!("{}{}{}", &caps[1], replacement_value, &caps[2]))
                .to_string();
            return true;
        }
    }
    false
}

#[cfg(test)]
mod test {
    use super::*;

    fn replacement(
        source_image: &str,
        source_registry: &str,
        source_repository: &str,
        source_tag: &str,
        target_image: &str,
        file_kind: FileKind,
    ) -> Replacement {
        Replacement {
            source_image: source_image.to_string(),
            source_registry: source_registry.to_string(),
            source_repository: source_repository.to_string(),
            source_tag: source_tag.to_string(),
            target_image: target_image.to_string(),
            file_kind,
            file_path: "test.yaml".to_string(),
            line_number: 1,
            context: String::new(),
        }
    }

    #[test]
    fn kubernetes_manifest_image_line_is_rewritten_preserving_quoting() {
        let content = "spec:\n  containers:\n    - image: \"nginx:1.25.3\"\n";
        let r = replacement(
            "nginx:1.25.3",
            "docker.io",
            "library/nginx",
            "1.25.3",
            "registry.example.com/library/nginx:1.25.3",
            FileKind::KubernetesManifest,
        );
        let (new_content, fired) = apply("deploy.yaml", content, &[r]).unwrap();
        assert_eq!(fired.len(), 1);
        assert!(new_content.contains("image: \"registry.example.com/library/nginx:1.25.3\""));
    }

    #[test]
    fn helm_separated_rewrites_registry_only_when_tag_unchanged() {
        let content = "image:\n  registry: docker.io\n  repository: bitnami/redis\n  tag: \"7.2.4\"\n";
        let r = replacement(
            "docker.io/bitnami/redis:7.2.4",
            "docker.io",
            "bitnami/redis",
            "7.2.4",
            "registry.example.com/bitnami/redis:7.2.4",
            FileKind::HelmSeparated,
        );
        let (new_content, fired) = apply("values.yaml", content, &[r]).unwrap();
        assert_eq!(fired.len(), 1);
        assert!(new_content.contains("registry: registry.example.com"));
        assert!(new_content.contains("repository: bitnami/redis"));
        assert!(new_content.contains("tag: \"7.2.4\""));
    }

    #[test]
    fn kustomize_pair_rewrites_new_name_and_keeps_unchanged_tag() {
        let content = "images:\n  - name: nginx\n    newName: nginx\n    newTag: \"1.21\"\n";
        let r = replacement(
            "nginx:1.21",
            "docker.io",
            "nginx",
            "1.21",
            "registry.example.com/library/nginx:1.21",
            FileKind::Kustomize,
        );
        let (new_content, fired) = apply("kustomization.yaml", content, &[r]).unwrap();
        assert_eq!(fired.len(), 1);
        assert!(new_content.contains("newName: registry.example.com/library/nginx"));
        assert!(new_content.contains("newTag: \"1.21\""));
    }

    #[test]
    fn unmatched_replacement_is_omitted_not_errored() {
        let content = "replicas: 1\n";
        let r = replacement(
            "nginx:1.25.3",
            "docker.io",
            "library/nginx",
            "1.25.3",
            "registry.example.com/library/nginx:1.25.3",
            FileKind::KubernetesManifest,
        );
        let (new_content, fired) = apply("deploy.yaml", content, &[r]).unwrap();
        assert!(fired.is_empty());
        assert_eq!(new_content, content);
    }

    #[test]
    fn unrelated_lines_are_preserved_verbatim() {
        let content = "# a comment\nreplicas: 3\nimage: nginx:1.25.3\nenv: prod\n";
        let r = replacement(
            "nginx:1.25.3",
            "docker.io",
            "library/nginx",
            "1.25.3",
            "registry.example.com/library/nginx:1.25.3",
            FileKind::KubernetesManifest,
        );
        let (new_content, _) = apply("deploy.yaml", content, &[r]).unwrap();
        assert!(new_content.contains("# a comment"));
        assert!(new_content.contains("replicas: 3"));
        assert!(new_content.contains("env: prod"));
    }
}
