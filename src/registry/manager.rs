//! Owns the live set of configured registry adapters and the operations run
//! against "all enabled registries": health checks, existence lookups, and
//! duplicate detection, the latter two run
//! concurrently with their own bounded pool rather than the user-facing
//! `settings.concurrency` value, since scanning registries is comparatively
//! cheap and shouldn't be starved by a low migration-concurrency setting.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, RwLock};

use tracing::{info, warn};

use crate::cluster::ImageUsage;
use crate::cmd::command::CancellationToken;
use crate::image::target::generate_target_name;
use crate::image::ImageReference;
use crate::registry::ecr::EcrAdapter;
use crate::registry::errors::RegistryError;
use crate::registry::generic::GenericRegistryAdapter;
use crate::registry::ghcr::GhcrAdapter;
use crate::registry::{ContainerRegistryAdapter, RegistryAdapter, RegistryConfig, RegistryKind, RegistryProductKind};
use crate::threadpool::BoundedThreadPool;

/// Registry scans are I/O bound HTTP/API calls; this cap keeps us polite to
/// registries under default settings regardless of the user's configured
/// migration concurrency.
const DEFAULT_SCAN_PARALLELISM: usize = 10;

pub struct RegistryManager {
    adapters: RwLock<HashMap<String, ContainerRegistryAdapter>>,
}

impl RegistryManager {
    pub fn new() -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
        }
    }

    /// Builds and registers an adapter for `cfg`, skipping disabled
    /// registries entirely.
    pub fn add_registry(&self, product_kind: RegistryProductKind, cfg: RegistryConfig) -> Result<(), RegistryError> {
        if !cfg.enabled {
            info!(registry = %cfg.name, "registry disabled, skipping");
            return Ok(());
        }

        let name = cfg.name.clone();
        let adapter: ContainerRegistryAdapter = match product_kind {
            RegistryProductKind::Docker | RegistryProductKind::Harbor => GenericRegistryAdapter::new(cfg)?.into(),
            RegistryProductKind::Ghcr => GhcrAdapter::new(cfg)?.into(),
            RegistryProductKind::Ecr => EcrAdapter::new(cfg)?.into(),
        };

        self.adapters.write().unwrap().insert(name, adapter);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.read().unwrap().is_empty()
    }

    /// Highest `priority` first, the order a migrated image is pushed to
    /// when operating in "highest priority only" mode.
    pub fn enabled_by_priority(&self) -> Vec<RegistryConfig> {
        let adapters = self.adapters.read().unwrap();
        let mut configs: Vec<RegistryConfig> = adapters.values().map(|a| a.config().clone()).collect();
        configs.sort_by(|a, b| b.priority.cmp(&a.priority));
        configs
    }

    pub fn kind_of(&self, registry_name: &str) -> Option<RegistryKind> {
        self.adapters.read().unwrap().get(registry_name).map(|a| a.kind())
    }

    pub fn login(&self, registry_name: &str, cancellation: &CancellationToken) -> Result<(), RegistryError> {
        let adapters = self.adapters.read().unwrap();
        let adapter = adapters
            .get(registry_name)
            .ok_or_else(|| RegistryError::RegistryNotFound(registry_name.to_string()))?;
        adapter.login(cancellation)
    }

    pub fn copy(&self, registry_name: &str, source: &str, target: &str, cancellation: &CancellationToken) -> Result<(), RegistryError> {
        let adapters = self.adapters.read().unwrap();
        let adapter = adapters
            .get(registry_name)
            .ok_or_else(|| RegistryError::RegistryNotFound(registry_name.to_string()))?;
        adapter.copy(source, target, cancellation)
    }

    pub fn has_image(&self, registry_name: &str, target_image: &str) -> Result<bool, RegistryError> {
        let adapters = self.adapters.read().unwrap();
        let adapter = adapters
            .get(registry_name)
            .ok_or_else(|| RegistryError::RegistryNotFound(registry_name.to_string()))?;
        adapter.has_image(target_image)
    }

    /// Runs `health_check` against every enabled registry concurrently,
    /// returning a `(name, Result)` pair per registry so a CLI `status`
    /// command can render a full table even when some registries are down.
    pub fn health_check_all(&self) -> Vec<(String, Result<(), RegistryError>)> {
        let names_and_configs: Vec<String> = {
            let adapters = self.adapters.read().unwrap();
            adapters.keys().cloned().collect()
        };

        let cancellation = CancellationToken::new();
        let tasks: Vec<_> = names_and_configs
            .into_iter()
            .map(|name| {
                move || {
                    let result = self.health_check_one(&name);
                    (name, result)
                }
            })
            .collect();

        let parallelism = NonZeroUsize::new(DEFAULT_SCAN_PARALLELISM.min(tasks.len().max(1))).unwrap();
        BoundedThreadPool::run(tasks, parallelism, &cancellation)
            .into_iter()
            .map(|result| match result {
                Ok(pair) => pair,
                Err(panic_message) => ("<unknown>".to_string(), Err(RegistryError::RegistryUnavailable {
                    registry_name: "<unknown>".to_string(),
                    raw_error_message: panic_message,
                })),
            })
            .collect()
    }

    fn health_check_one(&self, name: &str) -> Result<(), RegistryError> {
        let adapters = self.adapters.read().unwrap();
        let adapter = adapters.get(name).ok_or_else(|| RegistryError::RegistryNotFound(name.to_string()))?;
        adapter.health_check()
    }

    /// Checks whether `target_image` already exists in any enabled
    /// registry other than `skip_registry`, the duplicate-detection pass run
    /// before copying a fresh image so a second registry doesn't re-push
    /// what a higher-priority one already holds.
    pub fn find_image_in_registries(&self, target_repository_and_tag: &str, skip_registry: Option<&str>) -> Vec<String> {
        let names: Vec<String> = {
            let adapters = self.adapters.read().unwrap();
            adapters
                .keys()
                .filter(|name| Some(name.as_str()) != skip_registry)
                .cloned()
                .collect()
        };

        let cancellation = CancellationToken::new();
        let tasks: Vec<_> = names
            .into_iter()
            .map(|name| {
                let target = target_repository_and_tag.to_string();
                move || {
                    let found = self.has_image(&name, &target).unwrap_or_else(|err| {
                        warn!(registry = name, error = %err, "duplicate check failed, assuming absent");
                        false
                    });
                    (name, found)
                }
            })
            .collect();

        let parallelism = NonZeroUsize::new(DEFAULT_SCAN_PARALLELISM.min(tasks.len().max(1))).unwrap();
        BoundedThreadPool::run(tasks, parallelism, &cancellation)
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|(name, found)| found.then_some(name))
            .collect()
    }

    /// The single-image form of batch validation: tries every enabled
    /// registry by descending
    /// priority, generating that registry's own target name for `usage`
    /// and returning the first one that reports it present.
    pub fn find_private_image_for_usage(&self, usage: &ImageUsage) -> Option<(String, String)> {
        let image = ImageReference::parse(&usage.image).ok()?;
        for cfg in self.enabled_by_priority() {
            let Ok(target) = generate_target_name(&image, &cfg) else { continue };
            match self.has_image(&cfg.name, &target) {
                Ok(true) => return Some((target, cfg.name)),
                Ok(false) => continue,
                Err(err) => {
                    warn!(registry = %cfg.name, error = %err, "batch validation check failed, treating as absent");
                    continue;
                }
            }
        }
        None
    }

    /// Builds the `public image -> private image` proof table for "batch
    /// validation": every usage is checked against every enabled registry,
    /// concurrently, capped at `DEFAULT_SCAN_PARALLELISM`
    /// regardless of `settings.concurrency` since this is read-only and
    /// network bound. The first adapter (in priority order) that reports
    /// the generated target present wins; usages nobody has yet are simply
    /// absent from the map, not an error.
    pub fn validate_images_batch(&self, usages: &[ImageUsage]) -> HashMap<String, String> {
        let cancellation = CancellationToken::new();
        let validated: Mutex<HashMap<String, String>> = Mutex::new(HashMap::new());

        let tasks: Vec<_> = usages
            .iter()
            .cloned()
            .map(|usage| {
                let validated = &validated;
                move || {
                    if let Some((target, _registry_name)) = self.find_private_image_for_usage(&usage) {
                        validated.lock().unwrap().insert(usage.image.clone(), target);
                    }
                }
            })
            .collect();

        let parallelism = NonZeroUsize::new(DEFAULT_SCAN_PARALLELISM.min(tasks.len().max(1))).unwrap();
        BoundedThreadPool::run(tasks, parallelism, &cancellation);

        let map = validated.into_inner().unwrap();
        info!(checked = usages.len(), validated = map.len(), "batch validation complete");
        map
    }
}

impl Default for RegistryManager {
    fn default() -> Self {
        Self::new()
    }
}
