pub mod ecr;
pub mod errors;
pub mod generic;
pub mod ghcr;
pub mod manager;

use std::fmt;
use std::str::FromStr;

use enum_dispatch::enum_dispatch;

use crate::cmd::command::CancellationToken;
use crate::registry::errors::RegistryError;

pub use manager::RegistryManager;

/// Matches the four adapter shapes this crate distinguishes:
/// a bare OCI v2 endpoint, a registry that namespaces repositories under a
/// project (Harbor-like), a cloud account+region addressed registry
/// (ECR), and a registry namespaced under a GitHub org/user (GHCR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Generic,
    ProjectScoped,
    CloudHosted,
    OrgScoped,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistryKind::Generic => "generic",
            RegistryKind::ProjectScoped => "project-scoped",
            RegistryKind::CloudHosted => "cloud-hosted",
            RegistryKind::OrgScoped => "org-scoped",
        })
    }
}

/// The config file spells registry kinds the way operators think about
/// products (`docker`, `harbor`, `ecr`, `ghcr`); `RegistryKind` is the
/// capability-shaped enum the engine actually dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryProductKind {
    Docker,
    Harbor,
    Ecr,
    Ghcr,
}

impl FromStr for RegistryProductKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(RegistryProductKind::Docker),
            "harbor" => Ok(RegistryProductKind::Harbor),
            "ecr" => Ok(RegistryProductKind::Ecr),
            "ghcr" => Ok(RegistryProductKind::Ghcr),
            other => Err(format!("`{other}` is not a supported registry type")),
        }
    }
}

impl From<RegistryProductKind> for RegistryKind {
    fn from(value: RegistryProductKind) -> Self {
        match value {
            RegistryProductKind::Docker => RegistryKind::Generic,
            RegistryProductKind::Harbor => RegistryKind::ProjectScoped,
            RegistryProductKind::Ecr => RegistryKind::CloudHosted,
            RegistryProductKind::Ghcr => RegistryKind::OrgScoped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub name: String,
    pub kind: RegistryKind,
    pub enabled: bool,
    pub priority: i64,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: bool,
    pub project: Option<String>,
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub org_or_user: Option<String>,
}

/// Capability surface every registry adapter implements: login establishes
/// credentials in the local docker daemon, `copy` is pull-tag-push as one
/// logical step, `has_image` is a HEAD-style existence check that treats
/// "missing" as `Ok(false)` rather than an error, and `health_check` is a
/// readiness probe.
#[enum_dispatch]
pub trait RegistryAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> RegistryKind;
    fn config(&self) -> &RegistryConfig;

    fn login(&self, cancellation: &CancellationToken) -> Result<(), RegistryError>;
    fn copy(&self, source: &str, target: &str, cancellation: &CancellationToken) -> Result<(), RegistryError>;
    fn has_image(&self, target_image: &str) -> Result<bool, RegistryError>;
    fn health_check(&self) -> Result<(), RegistryError>;
}

#[enum_dispatch(RegistryAdapter)]
pub enum ContainerRegistryAdapter {
    Generic(generic::GenericRegistryAdapter),
    Ghcr(ghcr::GhcrAdapter),
    Ecr(ecr::EcrAdapter),
}
