//! Schedules the pull-tag-push copy of every public image to every target
//! registry with bounded concurrency: one task spawned per `(usage,
//! target)` pair, built on `crate::threadpool::BoundedThreadPool`.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::cluster::ImageUsage;
use crate::cmd::command::CancellationToken;
use crate::cmd::docker::{ContainerImage, Docker};
use crate::image::target::{generate_target_name, TargetGenerationError};
use crate::registry::errors::RegistryError;
use crate::registry::{RegistryConfig, RegistryManager};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("no enabled registries configured")]
    NoEnabledRegistries,
}

/// How a public image is distributed across the configured registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationMode {
    /// Only the single highest-`priority` registry receives a copy.
    HighestPriorityOnly,
    /// Every enabled registry receives a copy.
    FanOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub usage: ImageUsage,
    pub target_image: String,
    pub registry_name: String,
    pub success: bool,
    pub skipped: bool,
    pub reason: Option<String>,
    pub error: Option<String>,
}

impl MigrationResult {
    fn success(usage: ImageUsage, registry_name: String, target_image: String) -> Self {
        Self {
            usage,
            target_image,
            registry_name,
            success: true,
            skipped: false,
            reason: None,
            error: None,
        }
    }

    fn skipped(usage: ImageUsage, registry_name: String, target_image: String, reason: &str) -> Self {
        Self {
            usage,
            target_image,
            registry_name,
            success: false,
            skipped: true,
            reason: Some(reason.to_string()),
            error: None,
        }
    }

    fn failure(usage: ImageUsage, registry_name: String, target_image: String, error: impl ToString) -> Self {
        Self {
            usage,
            target_image,
            registry_name,
            success: false,
            skipped: false,
            reason: None,
            error: Some(error.to_string()),
        }
    }
}

/// `total == success + skipped + failure` holds after every task
/// completes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub failure: usize,
    pub errors: Vec<String>,
}

impl MigrationSummary {
    fn from_results(results: &[MigrationResult]) -> Self {
        let mut summary = MigrationSummary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            if result.skipped {
                summary.skipped += 1;
            } else if result.success {
                summary.success += 1;
            } else {
                summary.failure += 1;
                if let Some(error) = &result.error {
                    summary.errors.push(error.clone());
                }
            }
        }
        summary
    }
}

pub struct MigrationEngine<'a> {
    registries: &'a RegistryManager,
    concurrency: NonZeroUsize,
    dry_run: bool,
    docker: Docker,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(registries: &'a RegistryManager, concurrency: NonZeroUsize, dry_run: bool) -> Self {
        Self {
            registries,
            concurrency,
            dry_run,
            docker: Docker::new(),
        }
    }

    /// Runs the full migration for every public usage, against the
    /// registries selected by `mode`. Returns the per-pair results plus the
    /// aggregate summary.
    pub fn run(
        &self,
        usages: Vec<ImageUsage>,
        mode: MigrationMode,
        cancellation: &CancellationToken,
    ) -> Result<(Vec<MigrationResult>, MigrationSummary), MigrationError> {
        let enabled = self.registries.enabled_by_priority();
        if enabled.is_empty() {
            return Err(MigrationError::NoEnabledRegistries);
        }

        let targets: Vec<RegistryConfig> = match mode {
            MigrationMode::HighestPriorityOnly => vec![enabled[0].clone()],
            MigrationMode::FanOut => enabled,
        };

        let pairs: Vec<(ImageUsage, RegistryConfig)> = usages
            .into_iter()
            .flat_map(|usage| targets.iter().cloned().map(move |target| (usage.clone(), target)))
            .collect();

        info!(pairs = pairs.len(), concurrency = self.concurrency.get(), dry_run = self.dry_run, "starting migration run");

        let tasks: Vec<_> = pairs
            .into_iter()
            .map(|(usage, target)| move || self.migrate_one(usage, &target, cancellation))
            .collect();

        let results: Vec<MigrationResult> = crate::threadpool::BoundedThreadPool::run(tasks, self.concurrency, cancellation)
            .into_iter()
            .map(|result| result.unwrap_or_else(|panic_message| {
                warn!(error = %panic_message, "migration task panicked");
                MigrationResult {
                    usage: ImageUsage {
                        image: "<unknown>".to_string(),
                        namespace: String::new(),
                        workload_kind: "<unknown>",
                        workload_name: String::new(),
                        container_name: String::new(),
                        is_init_container: false,
                        is_public: true,
                    },
                    target_image: String::new(),
                    registry_name: String::new(),
                    success: false,
                    skipped: false,
                    reason: None,
                    error: Some(panic_message),
                }
            }))
            .collect();

        let summary = MigrationSummary::from_results(&results);
        Ok((results, summary))
    }

    fn migrate_one(&self, usage: ImageUsage, target: &RegistryConfig, cancellation: &CancellationToken) -> MigrationResult {
        let image = match crate::image::ImageReference::parse(&usage.image) {
            Ok(image) => image,
            Err(err) => return MigrationResult::failure(usage.clone(), target.name.clone(), String::new(), err),
        };

        let target_image = match generate_target_name(&image, target) {
            Ok(name) => name,
            Err(err) => return MigrationResult::failure(usage.clone(), target.name.clone(), String::new(), err),
        };

        if self.dry_run {
            return MigrationResult::success(usage, target.name.clone(), target_image);
        }

        match self.registries.has_image(&target.name, &target_image) {
            Ok(true) => return MigrationResult::skipped(usage, target.name.clone(), target_image, "already exists"),
            Ok(false) => {}
            Err(err) => warn!(registry = target.name, error = %err, "duplicate check failed, proceeding with copy"),
        }

        if let Err(err) = self.registries.login(&target.name, cancellation) {
            return MigrationResult::failure(usage, target.name.clone(), target_image, err);
        }

        if let Err(err) = self.registries.copy(&target.name, &usage.image, &target_image, cancellation) {
            return MigrationResult::failure(usage, target.name.clone(), target_image, err);
        }

        if let Err(err) = self.docker.remove_local_image(&ContainerImage::new(usage.image.clone())) {
            warn!(image = usage.image, error = %err, "failed to remove local image after copy, ignoring");
        }

        MigrationResult::success(usage, target.name.clone(), target_image)
    }
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
    fn summary_invariant_holds_for_mixed_results() {
        let results = vec![
            MigrationResult::success(usage("nginx:latest"), "r1".to_string(), "r1/nginx:latest".to_string()),
            MigrationResult::skipped(usage("redis:7"), "r1".to_string(), "r1/redis:7".to_string(), "already exists"),
            MigrationResult::failure(usage("bad:1"), "r1".to_string(), String::new(), RegistryError::RegistryNotFound("r1".to_string())),
        ];
        let summary = MigrationSummary::from_results(&results);
        assert_eq!(summary.total, summary.success + summary.skipped + summary.failure);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.errors.len(), 1);
    }
}
