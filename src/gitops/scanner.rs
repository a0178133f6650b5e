//! Detects public image references inside a fixed set of YAML shapes:
//! plain Kubernetes manifests, Helm `values.yaml` (both the
//! `{registry, repository, tag}` and combined `repository: host/ns/app`
//! forms), Kustomize `images:` overrides, and ArgoCD `Application`
//! manifests with an inline Helm `values: |` block. Pure line-oriented
//! scanning, no full YAML parse, so indentation, quoting, and unrelated
//! content are left untouched for the replacer downstream.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cluster::ImageUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    KubernetesManifest,
    HelmValues,
    HelmSeparated,
    HelmCombined,
    Kustomize,
    ArgocdApplication,
    GenericYaml,
}

impl FileKind {
    /// Informational score assigned per recognizer: exact manifest matches
    /// are the most trustworthy, generic fallback the least.
    pub fn default_confidence(self) -> f32 {
        match self {
            FileKind::KubernetesManifest => 1.0,
            FileKind::HelmSeparated | FileKind::HelmCombined | FileKind::HelmValues => 0.95,
            FileKind::Kustomize => 0.9,
            FileKind::ArgocdApplication => 0.9,
            FileKind::GenericYaml => 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionResult {
    // field list unchanged; see struct body below
    pub full_image: String,
    pub registry: String,
    pub repository: String,
    pub tag: String,
    pub line_number: usize,
    pub file_path: String,
    pub file_kind: FileKind,
    pub context: String,
    pub confidence: f32,
}

static IMAGE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^(\s*)image:\s*["']?([^"'#\s][^"'#]*?)["']?\s*$"#).unwrap());
static IMAGE_BLOCK_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)image:\s*$").unwrap());
static HELM_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(\s*)(registry|repository|tag):\s*["']?([^"'#\s][^"'#]*?)["']?\s*$"#).unwrap());
static KUSTOMIZE_IMAGES_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)images:\s*$").unwrap());
static KUSTOMIZE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^(\s*)-\s*name:\s*["']?([^"'#\s]+)["']?\s*$"#).unwrap());
static KUSTOMIZE_NEW_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^(\s*)newName:\s*["']?([^"'#\s]+)["']?\s*$"#).unwrap());
static KUSTOMIZE_NEW_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^(\s*)newTag:\s*["']?([^"'#\s]+)["']?\s*$"#).unwrap());
static VALUES_BLOCK_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)values:\s*\|-?\s*$").unwrap());

pub struct FileScanner;

impl FileScanner {
    /// Builds the lookup set of canonical `repository:tag` strings that a
    /// detection must match to survive the public-image filter: both the
    /// exact tag and, for usages with no explicit tag, `:latest` as well.
    pub fn public_image_index(usages: &[ImageUsage]) -> HashSet<String> {
        let mut index = HashSet::new();
        for usage in usages {
            index.insert(usage.image.clone());
            if !usage.image.contains(':') || usage.image.rsplit_once(':').is_none_or(|(_, t)| t.is_empty()) {
                index.insert(format!("{}:latest", usage.image));
            }
        }
        index
    }

    /// Picks a file's kind from its path and a content sniff: filename
    /// hints first, content indicators as a fallback.
    pub fn classify_file(path: &str, content: &str) -> FileKind {
        let lower_path = path.to_lowercase();
        if lower_path.ends_with("kustomization.yaml") || lower_path.ends_with("kustomization.yml") {
            return FileKind::Kustomize;
        }
        if lower_path.ends_with("values.yaml") || lower_path.ends_with("values.yml") {
            return FileKind::HelmValues;
        }
        if content.contains("argoproj.io") && content.contains("kind: Application") {
            return FileKind::ArgocdApplication;
        }
        const MANIFEST_KINDS: [&str; 6] = ["kind: Deployment", "kind: StatefulSet", "kind: DaemonSet", "kind: Job", "kind: CronJob", "kind: Pod"];
        if MANIFEST_KINDS.iter().any(|k| content.contains(k)) {
            return FileKind::KubernetesManifest;
        }
        FileKind::GenericYaml
    }

    /// Scans one file's content, filtering detections down to those whose
    /// full image matches `public_images`.
    pub fn scan_file(path: &str, content: &str, file_kind: FileKind, public_images: &HashSet<String>) -> Vec<DetectionResult> {
        let mut detections = Vec::new();

        match file_kind {
            FileKind::HelmValues => {
                detections.extend(scan_helm_block(path, content, 0));
                detections.extend(scan_generic(path, content, FileKind::GenericYaml));
            }
            FileKind::Kustomize => {
                detections.extend(scan_kustomize(path, content));
            }
            FileKind::ArgocdApplication => {
                detections.extend(scan_generic(path, content, FileKind::ArgocdApplication));
                detections.extend(scan_argocd_inline_values(path, content));
            }
            FileKind::KubernetesManifest | FileKind::GenericYaml => {
                detections.extend(scan_generic(path, content, file_kind));
            }
            FileKind::HelmSeparated | FileKind::HelmCombined => unreachable!("not a file-level classification"),
        }

        detections.retain(|d| public_images.contains(&d.full_image));
        detections
    }
}

fn scan_generic(path: &str, content: &str, file_kind: FileKind) -> Vec<DetectionResult> {
    let mut detections = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if let Some(captures) = IMAGE_LINE.captures(line) {
            let value = captures.get(2).unwrap().as_str().trim();
            if let Some(detection) = detection_from_full_image(value, idx + 1, path, file_kind, line) {
                detections.push(detection);
            }
        }
    }
    detections
}

fn detection_from_full_image(full_image: &str, line_number: usize, path: &str, file_kind: FileKind, context_line: &str) -> Option<DetectionResult> {
    if full_image.is_empty() {
        return None;
    }
    let (repository_and_registry, tag) = match full_image.rsplit_once(':') {
        Some((head, tag)) if full_image.rfind('/').is_none_or(|slash| full_image.rfind(':').unwrap() > slash) => {
            (head, tag.to_string())
        }
        _ => (full_image, "latest".to_string()),
    };
    let (registry, repository) = match repository_and_registry.split_once('/') {
        Some((maybe_registry, rest)) if maybe_registry.contains('.') || maybe_registry.contains(':') => {
            (maybe_registry.to_string(), rest.to_string())
        }
        _ => ("docker.io".to_string(), repository_and_registry.to_string()),
    };

    Some(DetectionResult {
        full_image: full_image.to_string(),
        registry,
        repository,
        tag,
        line_number,
        file_path: path.to_string(),
        file_kind,
        context: context_line.trim().to_string(),
        confidence: file_kind.default_confidence(),
    })
}

#[derive(Default)]
struct HelmBlockState {
    base_indent: Option<usize>,
    registry: Option<(usize, String)>,
    repository: Option<(usize, String)>,
    tag: Option<(usize, String)>,
}

impl HelmBlockState {
    fn flush(&mut self, path: &str) -> Option<DetectionResult> {
        let result = if let (Some((_, registry)), Some((line, repository)), Some((_, tag))) =
            (&self.registry, &self.repository, &self.tag)
        {
            Some(DetectionResult {
                full_image: format!("{registry}/{repository}:{tag}"),
                registry: registry.clone(),
                repository: repository.clone(),
                tag: tag.clone(),
                line_number: *line,
                file_path: path.to_string(),
                file_kind: FileKind::HelmSeparated,
                context: format!("image.registry={registry} image.repository={repository} image.tag={tag}"),
                confidence: FileKind::HelmSeparated.default_confidence(),
            })
        } else if let (Some((line, repository)), Some((_, tag))) = (&self.repository, &self.tag) {
            let first_segment = repository.split('/').next().unwrap_or(repository);
            if first_segment.contains('.') {
                let (registry, rest) = repository.split_once('/').unwrap_or(("docker.io", repository));
                Some(DetectionResult {
                    full_image: format!("{repository}:{tag}"),
                    registry: registry.to_string(),
                    repository: rest.to_string(),
                    tag: tag.clone(),
                    line_number: *line,
                    file_path: path.to_string(),
                    file_kind: FileKind::HelmCombined,
                    context: format!("image.repository={repository} image.tag={tag}"),
                    confidence: FileKind::HelmCombined.default_confidence(),
                })
            } else {
                None
            }
        } else {
            None
        };

        *self = HelmBlockState::default();
        result
    }
}

fn scan_helm_block(path: &str, content: &str, _unused_offset: usize) -> Vec<DetectionResult> {
    let mut detections = Vec::new();
    let mut state = HelmBlockState::default();

    for (idx, line) in content.lines().enumerate() {
        let line_number = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        if let Some(captures) = IMAGE_BLOCK_START.captures(line) {
            if let Some(detection) = state.flush(path) {
                detections.push(detection);
            }
            state.base_indent = Some(captures.get(1).unwrap().as_str().len());
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        match state.base_indent {
            Some(base) if indent > base => {
                if let Some(captures) = HELM_FIELD.captures(line) {
                    let field = captures.get(2).unwrap().as_str();
                    let value = captures.get(3).unwrap().as_str().to_string();
                    match field {
                        "registry" => state.registry = Some((line_number, value)),
                        "repository" => state.repository = Some((line_number, value)),
                        "tag" => state.tag = Some((line_number, value)),
                        _ => {}
                    }
                }
            }
            Some(_) => {
                if let Some(detection) = state.flush(path) {
                    detections.push(detection);
                }
            }
            None => {}
        }
    }

    if let Some(detection) = state.flush(path) {
        detections.push(detection);
    }

    detections
}

fn scan_kustomize(path: &str, content: &str) -> Vec<DetectionResult> {
    let mut detections = Vec::new();
    let mut in_images_block = false;
    let mut images_indent = 0usize;
    let mut current_name: Option<String> = None;
    let mut current_new_name: Option<(usize, String)> = None;
    let mut current_new_tag: Option<String> = None;

    let flush = |detections: &mut Vec<DetectionResult>, new_name: &Option<(usize, String)>, new_tag: &Option<String>, path: &str| {
        if let (Some((line, name)), Some(tag)) = (new_name, new_tag) {
            detections.push(DetectionResult {
                full_image: format!("{name}:{tag}"),
                registry: "docker.io".to_string(),
                repository: name.clone(),
                tag: tag.clone(),
                line_number: *line,
                file_path: path.to_string(),
                file_kind: FileKind::Kustomize,
                context: format!("newName={name} newTag={tag}"),
                confidence: FileKind::Kustomize.default_confidence(),
            });
        }
    };

    for (idx, line) in content.lines().enumerate() {
        let line_number = idx + 1;
        if let Some(captures) = KUSTOMIZE_IMAGES_START.captures(line) {
            in_images_block = true;
            images_indent = captures.get(1).unwrap().as_str().len();
            continue;
        }
        if !in_images_block {
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        if line.trim().is_empty() {
            continue;
        }
        if indent <= images_indent {
            flush(&mut detections, &current_new_name, &current_new_tag, path);
            current_name = None;
            current_new_name = None;
            current_new_tag = None;
            in_images_block = false;
            continue;
        }

        if let Some(captures) = KUSTOMIZE_NAME.captures(line) {
            flush(&mut detections, &current_new_name, &current_new_tag, path);
            current_name = Some(captures.get(2).unwrap().as_str().to_string());
            current_new_name = None;
            current_new_tag = None;
            continue;
        }
        if let Some(captures) = KUSTOMIZE_NEW_NAME.captures(line) {
            current_new_name = Some((line_number, captures.get(2).unwrap().as_str().to_string()));
            continue;
        }
        if let Some(captures) = KUSTOMIZE_NEW_TAG.captures(line) {
            current_new_tag = Some(captures.get(2).unwrap().as_str().to_string());
        }
    }

    let _ = current_name;
    flush(&mut detections, &current_new_name, &current_new_tag, path);
    detections
}

/// ArgoCD `Application` manifests frequently inline a Helm values block
/// under `spec.source.helm.values: |`; re-runs the Helm block scanner
/// against just that nested region, using the block's own indentation as
/// the baseline so line numbers still point at the original file.
fn scan_argocd_inline_values(path: &str, content: &str) -> Vec<DetectionResult> {
    let lines: Vec<&str> = content.lines().collect();
    let mut detections = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        if let Some(captures) = VALUES_BLOCK_START.captures(lines[idx]) {
            let baseline = captures.get(1).unwrap().as_str().len();
            let mut block_lines = Vec::new();
            let mut cursor = idx + 1;
            while cursor < lines.len() {
                let line = lines[cursor];
                if line.trim().is_empty() {
                    block_lines.push((cursor, line));
                    cursor += 1;
                    continue;
                }
                let indent = line.len() - line.trim_start().len();
                if indent <= baseline {
                    break;
                }
                block_lines.push((cursor, line));
                cursor += 1;
            }

            let nested_content: String = block_lines.iter().map(|(_, l)| *l).collect::<Vec<_>>().join("\n");
            for mut detection in scan_helm_block(path, &nested_content, 0) {
                // nested scan line numbers are 1-based within `nested_content`;
                // translate back to the real file's line numbers.
                let real_line = block_lines.get(detection.line_number - 1).map(|(line, _)| line + 1);
                if let Some(real_line) = real_line {
                    detection.line_number = real_line;
                    detection.file_kind = FileKind::ArgocdApplication;
                    detections.push(detection);
                }
            }

            idx = cursor;
            continue;
        }
        idx += 1;
    }

    detections
}

#[cfg(test)]
mod test {
    use super::*;

    fn usage(image: &str) -> ImageUsage {
        ImageUsage {
            image: image.to_string(),
            namespace: "default".to_string(),
            workload_kind: "Deployment",
            workload_name: "web".to_string(),
            container_name: "web".to_string(),
            is_init_container: false,
            is_public: true,
        }
    }

    #[test]
    fn kubernetes_manifest_image_line_is_detected() {
        let content = "apiVersion: apps/v1\nkind: Deployment\nspec:\n  template:\n    spec:\n      containers:\n        - name: web\n          image: nginx:1.25.3\n";
        let index = FileScanner::public_image_index(&[usage("nginx:1.25.3")]);
        let kind = FileScanner::classify_file("deploy.yaml", content);
        assert_eq!(kind, FileKind::KubernetesManifest);
        let detections = FileScanner::scan_file("deploy.yaml", content, kind, &index);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].full_image, "nginx:1.25.3");
        assert_eq!(detections[0].line_number, 8);
    }

    #[test]
    fn helm_separated_block_is_detected() {
        let content = "image:\n  registry: docker.io\n  repository: bitnami/redis\n  tag: 7.2.4\nreplicas: 1\n";
        let index = FileScanner::public_image_index(&[usage("bitnami/redis:7.2.4")]);
        let kind = FileScanner::classify_file("values.yaml", content);
        assert_eq!(kind, FileKind::HelmValues);
        let detections = FileScanner::scan_file("values.yaml", content, kind, &index);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].file_kind, FileKind::HelmSeparated);
        assert_eq!(detections[0].full_image, "docker.io/bitnami/redis:7.2.4");
    }

    #[test]
    fn kustomize_images_sequence_is_detected() {
        let content = "images:\n  - name: app\n    newName: registry.example.com/app\n    newTag: \"1.0\"\n";
        let index = FileScanner::public_image_index(&[usage("registry.example.com/app:1.0")]);
        let kind = FileScanner::classify_file("kustomization.yaml", content);
        assert_eq!(kind, FileKind::Kustomize);
        let detections = FileScanner::scan_file("kustomization.yaml", content, kind, &index);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].full_image, "registry.example.com/app:1.0");
    }

    #[test]
    fn non_public_images_are_dropped_by_the_filter() {
        let content = "kind: Deployment\nimage: nginx:1.25.3\n";
        let index = FileScanner::public_image_index(&[usage("redis:7")]);
        let kind = FileScanner::classify_file("deploy.yaml", content);
        let detections = FileScanner::scan_file("deploy.yaml", content, kind, &index);
        assert!(detections.is_empty());
    }
}
