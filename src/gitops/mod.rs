//! Scans each configured GitOps repository for validated public image
//! references and opens a pull request rewriting them, built on top of the
//! scanner and replacer modules. Bounded concurrency across repositories
//! mirrors
//! `crate::migration::MigrationEngine`; work inside one repository is
//! strictly sequential to avoid a write race on its branch.

pub mod errors;
pub mod githost;
pub mod replacer;
pub mod scanner;

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::cluster::ImageUsage;
use crate::cmd::command::CancellationToken;
use crate::config::{GithubRepositoryConfig, GitopsConfig};
use crate::gitops::errors::GitOpsError;
use crate::gitops::githost::{GitHostClient, PullRequestRef};
use crate::gitops::replacer::Replacement;
use crate::gitops::scanner::{DetectionResult, FileScanner};
use crate::image::ImageReference;
use crate::threadpool::BoundedThreadPool;

/// A repository processing attempt's progress, `Start → … → Done`, or
/// `Failed` at whichever stage the error surfaced in. Kept on
/// `GitOpsResult` purely for diagnostics; no stage transition is ever
/// rolled back on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepoStage {
    Start,
    Validated,
    Scanned,
    Resolved,
    Replaced,
    Branched,
    Written,
    PRed,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitOpsResult {
    pub repository: String,
    pub branch: Option<String>,
    pub pull_request: Option<PullRequestRef>,
    pub files_changed: Vec<String>,
    pub images_changed: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
    pub processing_time: Duration,
    pub stage: RepoStage,
}

impl GitOpsResult {
    fn failed(repository: String, stage: RepoStage, error: impl ToString, elapsed: Duration) -> Self {
        Self {
            repository,
            branch: None,
            pull_request: None,
            files_changed: Vec::new(),
            images_changed: Vec::new(),
            success: false,
            error: Some(error.to_string()),
            processing_time: elapsed,
            stage,
        }
    }
}

/// `total == success + failure`, the same aggregation shape
/// `MigrationSummary` uses, over repositories instead of `(usage,
/// registry)` pairs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GitOpsSummary {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub files_changed: usize,
    pub images_changed: usize,
    pub pull_requests_opened: usize,
    pub errors: Vec<String>,
}

impl GitOpsSummary {
    fn from_results(results: &[GitOpsResult]) -> Self {
        let mut summary = GitOpsSummary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            if result.success {
                summary.success += 1;
            } else {
                summary.failure += 1;
                if let Some(error) = &result.error {
                    summary.errors.push(error.clone());
                }
            }
            summary.files_changed += result.files_changed.len();
            summary.images_changed += result.images_changed.len();
            if result.pull_request.is_some() {
                summary.pull_requests_opened += 1;
            }
        }
        summary
    }
}

pub struct GitOpsEngine<'a> {
    client: &'a dyn GitHostClient,
    config: &'a GitopsConfig,
    concurrency: NonZeroUsize,
}

impl<'a> GitOpsEngine<'a> {
    pub fn new(client: &'a dyn GitHostClient, config: &'a GitopsConfig, concurrency: NonZeroUsize) -> Self {
        Self { client, config, concurrency }
    }

    /// Processes every enabled repository, highest `priority` first,
    /// against the batch-validated `public -> private` map.
    pub fn run(
        &self,
        repositories: &[GithubRepositoryConfig],
        validated_map: &HashMap<String, String>,
        public_usages: &[ImageUsage],
        cancellation: &CancellationToken,
    ) -> (Vec<GitOpsResult>, GitOpsSummary) {
        let mut enabled: Vec<&GithubRepositoryConfig> = repositories.iter().filter(|r| r.enabled).collect();
        enabled.sort_by(|a, b| b.priority.cmp(&a.priority));

        info!(repositories = enabled.len(), "starting gitops run");

        let tasks: Vec<_> = enabled
            .into_iter()
            .map(|repo| move || self.process_repository(repo, validated_map, public_usages, cancellation))
            .collect();

        let results: Vec<GitOpsResult> = BoundedThreadPool::run(tasks, self.concurrency, cancellation)
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|panic_message| {
                    warn!(error = %panic_message, "gitops repository task panicked");
                    GitOpsResult::failed("<unknown>".to_string(), RepoStage::Failed, panic_message, Duration::ZERO)
                })
            })
            .collect();

        let summary = GitOpsSummary::from_results(&results);
        (results, summary)
    }

    fn process_repository(
        &self,
        repo: &GithubRepositoryConfig,
        validated_map: &HashMap<String, String>,
        public_usages: &[ImageUsage],
        cancellation: &CancellationToken,
    ) -> GitOpsResult {
        let started = Instant::now();

        match self.try_process_repository(repo, validated_map, public_usages, cancellation) {
            Ok(mut result) => {
                result.processing_time = started.elapsed();
                result
            }
            Err((stage, err)) => {
                warn!(repository = %repo.name, stage = ?stage, error = %err, "gitops repository run failed");
                GitOpsResult::failed(repo.name.clone(), stage, err, started.elapsed())
            }
        }
    }

    fn try_process_repository(
        &self,
        repo: &GithubRepositoryConfig,
        validated_map: &HashMap<String, String>,
        public_usages: &[ImageUsage],
        cancellation: &CancellationToken,
    ) -> Result<GitOpsResult, (RepoStage, GitOpsError)> {
        if cancellation.is_cancelled() {
            return Err((RepoStage::Start, GitOpsError::Transport("cancelled before start".to_string())));
        }

        let default_branch = self
            .client
            .default_branch(&repo.name)
            .map_err(|err| (RepoStage::Validated, err))?;

        let tree = self
            .client
            .list_tree(&repo.name, &default_branch)
            .map_err(|err| (RepoStage::Validated, err))?;

        let yaml_paths: Vec<String> = tree
            .into_iter()
            .filter(|entry| entry.is_blob)
            .map(|entry| entry.path)
            .filter(|path| path_is_included(path, &repo.paths, &repo.excluded_paths))
            .filter(|path| path.ends_with(".yaml") || path.ends_with(".yml"))
            .collect();

        let public_index = FileScanner::public_image_index(public_usages);

        let mut detections: Vec<DetectionResult> = Vec::new();
        let mut file_contents: HashMap<String, String> = HashMap::new();
        for path in &yaml_paths {
            let content = self
                .client
                .get_file_content(&repo.name, &default_branch, path)
                .map_err(|err| (RepoStage::Scanned, err))?;
            let kind = FileScanner::classify_file(path, &content);
            detections.extend(FileScanner::scan_file(path, &content, kind, &public_index));
            file_contents.insert(path.clone(), content);
        }

        // Fill in empty/templated tags before joining against
        // the validated map, so a detection like `tag: ""` still resolves
        // to a real private image when the config allows it.
        let tag_resolution = &self.config.tag_resolution;
        if tag_resolution.enabled && tag_resolution.auto_fill_empty_tags {
            let cluster_index = build_cluster_tag_index(public_usages);
            resolve_empty_tags(&mut detections, validated_map, &cluster_index, tag_resolution);
        }

        // A detection not present in the validated map means
        // cluster migration hasn't happened for that image yet; drop it
        // silently rather than guessing.
        let replacements: Vec<Replacement> = detections
            .iter()
            .filter_map(|detection| validated_map.get(&detection.full_image).map(|target| Replacement::from_detection(detection, target.clone())))
            .collect();

        if replacements.is_empty() {
            info!(repository = %repo.name, "no validated replacements, nothing to do");
            return Ok(GitOpsResult {
                repository: repo.name.clone(),
                branch: None,
                pull_request: None,
                files_changed: Vec::new(),
                images_changed: Vec::new(),
                success: true,
                error: None,
                processing_time: Duration::ZERO,
                stage: RepoStage::Done,
            });
        }

        let mut by_file: HashMap<String, Vec<Replacement>> = HashMap::new();
        for replacement in replacements {
            by_file.entry(replacement.file_path.clone()).or_default().push(replacement);
        }

        let branch_name = format!("{}{}-{}", self.config.branch_prefix, slug(&repo.name), Utc::now().format("%Y%m%d%H%M%S"));
        self.client
            .create_branch(&repo.name, &branch_name, &default_branch)
            .map_err(|err| (RepoStage::Branched, err))?;

        let mut files_changed = Vec::new();
        let mut images_changed: HashSet<String> = HashSet::new();

        for (path, file_replacements) in by_file {
            let Some(content) = file_contents.get(&path) else { continue };
            let (new_content, fired) = replacer::apply(&path, content, &file_replacements).map_err(|err| (RepoStage::Replaced, err))?;

            if fired.is_empty() || &new_content == content {
                continue;
            }

            let commit_message = self.config.commit_message.replace("{image}", &summarize_images(&fired));
            self.client
                .update_file(&repo.name, &branch_name, &path, &new_content, &commit_message)
                .map_err(|err| (RepoStage::Written, err))?;

            files_changed.push(path);
            images_changed.extend(fired.into_iter().map(|r| r.source_image));
        }

        if files_changed.is_empty() {
            info!(repository = %repo.name, "no file content changed, skipping pull request");
            return Ok(GitOpsResult {
                repository: repo.name.clone(),
                branch: Some(branch_name),
                pull_request: None,
                files_changed: Vec::new(),
                images_changed: Vec::new(),
                success: true,
                error: None,
                processing_time: Duration::ZERO,
                stage: RepoStage::Written,
            });
        }

        let mut pull_request = None;
        if self.config.auto_pr {
            let title = format!("chore: migrate {} image(s) to private registry", images_changed.len());
            let body = repo
                .pr_settings
                .template
                .clone()
                .unwrap_or_else(|| pull_request_body(&images_changed, &files_changed));
            let pr = self
                .client
                .create_pull_request(&repo.name, &branch_name, &default_branch, &title, &body, repo.pr_settings.draft)
                .map_err(|err| (RepoStage::PRed, err))?;

            if !repo.pr_settings.reviewers.is_empty() {
                if let Err(err) = self.client.add_reviewers(&repo.name, pr.number, &repo.pr_settings.reviewers) {
                    warn!(repository = %repo.name, error = %err, "failed to add reviewers, continuing");
                }
            }
            if !repo.pr_settings.labels.is_empty() {
                if let Err(err) = self.client.add_labels(&repo.name, pr.number, &repo.pr_settings.labels) {
                    warn!(repository = %repo.name, error = %err, "failed to add labels, continuing");
                }
            }

            pull_request = Some(pr);
        }

        Ok(GitOpsResult {
            repository: repo.name.clone(),
            branch: Some(branch_name),
            pull_request,
            files_changed,
            images_changed: images_changed.into_iter().collect(),
            success: true,
            error: None,
            processing_time: Duration::ZERO,
            stage: RepoStage::Done,
        })
    }
}

fn path_is_included(path: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|prefix| path.starts_with(prefix.as_str())) {
        return false;
    }
    if include.is_empty() {
        return true;
    }
    include.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path.starts_with(pattern.as_str()),
    })
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

fn summarize_images(replacements: &[Replacement]) -> String {
    replacements
        .iter()
        .map(|r| r.source_image.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn pull_request_body(images_changed: &HashSet<String>, files_changed: &[String]) -> String {
    let mut body = String::from("Automated migration to private registries.\n\n| Image | \n|---|\n");
    for image in images_changed {
        body.push_str(&format!("| {image} |\n"));
    }
    body.push_str(&format!("\nFiles changed: {}\n", files_changed.len()));
    body
}

/// Builds the cluster-derived tag index: every cluster-observed public image's
/// tag, keyed by several repository-suffix variants of its
/// `ImageReference::full_repository()` (the full namespaced path, and
/// each shorter suffix split on `/`), so a detection whose repository is
/// only a partial match (e.g. a Helm chart that drops the registry host)
/// can still look its tag up.
fn build_cluster_tag_index(public_usages: &[ImageUsage]) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for usage in public_usages {
        let Ok(parsed) = ImageReference::parse(&usage.image) else { continue };
        let full_repo = parsed.full_repository();
        let segments: Vec<&str> = full_repo.split('/').collect();
        for start in 0..segments.len() {
            let suffix = segments[start..].join("/");
            index.entry(suffix).or_insert_with(|| parsed.tag.clone());
        }
    }
    index
}

/// Fills in detections whose tag is empty, templated (`{{…}}` / `${…}`),
/// or the literal `"latest"`, via a two-stage resolution: (a)
/// look the repository up in the cluster-derived tag index, (b) fall back
/// to a small ordered list of common tags. A candidate is only applied if
/// the resulting `{repository}:{tag}` is already a proven-private key of
/// `validated_map`, unless `require_private_exists` is turned off.
fn resolve_empty_tags(
    detections: &mut [DetectionResult],
    validated_map: &HashMap<String, String>,
    cluster_index: &HashMap<String, String>,
    cfg: &crate::config::TagResolutionConfig,
) {
    for detection in detections.iter_mut() {
        if !tag_needs_resolution(&detection.tag, cfg) {
            continue;
        }

        let mut candidates: Vec<String> = Vec::new();
        if cfg.prefer_cluster_tags {
            if let Some(tag) = cluster_index.get(detection.repository.as_str()) {
                candidates.push(tag.clone());
            }
        }
        candidates.extend(cfg.common_tags_to_try.iter().cloned());
        if !candidates.contains(&cfg.fallback_tag) {
            candidates.push(cfg.fallback_tag.clone());
        }

        for candidate in candidates {
            let candidate_image = format!("{}/{}:{}", detection.registry, detection.repository, candidate);
            if !cfg.require_private_exists || validated_map.contains_key(&candidate_image) {
                detection.tag = candidate;
                detection.full_image = candidate_image;
                break;
            }
        }
    }
}

fn tag_needs_resolution(tag: &str, cfg: &crate::config::TagResolutionConfig) -> bool {
    if tag.is_empty() || tag.contains("{{") || tag.contains("${") {
        return true;
    }
    cfg.consider_latest_empty && tag == "latest"
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn path_inclusion_respects_exclude_before_include() {
        assert!(!path_is_included("vendor/app.yaml", &["".to_string()], &["vendor/".to_string()]));
        assert!(path_is_included("charts/app/values.yaml", &["charts/*".to_string()], &[]));
        assert!(!path_is_included("docs/readme.yaml", &["charts/*".to_string()], &[]));
    }

    #[test]
    fn slug_lowercases_and_replaces_non_alphanumeric() {
        assert_eq!(slug("Acme/My-Repo"), "acme-my-repo");
    }

    #[test]
    fn summary_invariant_holds_for_mixed_results() {
        let results = vec![
            GitOpsResult {
                repository: "acme/app".to_string(),
                branch: Some("privateer/acme-app-1".to_string()),
                pull_request: None,
                files_changed: vec!["deploy.yaml".to_string()],
                images_changed: vec!["nginx:1.25.3".to_string()],
                success: true,
                error: None,
                processing_time: Duration::ZERO,
                stage: RepoStage::Done,
            },
            GitOpsResult::failed("acme/other".to_string(), RepoStage::Validated, "repository not found", Duration::ZERO),
        ];
        let summary = GitOpsSummary::from_results(&results);
        assert_eq!(summary.total, summary.success + summary.failure);
        assert_eq!(summary.files_changed, 1);
        assert_eq!(summary.errors.len(), 1);
    }

    #[test]
    fn cluster_tag_index_resolves_empty_tag_by_repository_suffix() {
        let usages = vec![ImageUsage {
            image: "bitnami/redis:7.2.4".to_string(),
            namespace: "default".to_string(),
            workload_kind: "Deployment",
            workload_name: "cache".to_string(),
            container_name: "redis".to_string(),
            is_init_container: false,
            is_public: true,
        }];
        let index = build_cluster_tag_index(&usages);
        assert_eq!(index.get("bitnami/redis").map(String::as_str), Some("7.2.4"));
        assert_eq!(index.get("redis").map(String::as_str), Some("7.2.4"));

        let mut detections = vec![DetectionResult {
            full_image: "docker.io/bitnami/redis:".to_string(),
            registry: "docker.io".to_string(),
            repository: "bitnami/redis".to_string(),
            tag: String::new(),
            line_number: 4,
            file_path: "values.yaml".to_string(),
            file_kind: crate::gitops::scanner::FileKind::HelmSeparated,
            context: String::new(),
            confidence: 0.95,
        }];
        let mut validated_map = HashMap::new();
        validated_map.insert("docker.io/bitnami/redis:7.2.4".to_string(), "registry.example.com/bitnami/redis:7.2.4".to_string());

        let cfg = crate::config::TagResolutionConfig {
            enabled: true,
            auto_fill_empty_tags: true,
            prefer_cluster_tags: true,
            consider_latest_empty: false,
            fallback_tag: "latest".to_string(),
            require_private_exists: true,
            common_tags_to_try: vec!["stable".to_string()],
        };

        resolve_empty_tags(&mut detections, &validated_map, &index, &cfg);
        assert_eq!(detections[0].tag, "7.2.4");
        assert_eq!(detections[0].full_image, "docker.io/bitnami/redis:7.2.4");
    }
}
