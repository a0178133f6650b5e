use thiserror::Error;

use crate::cluster::ClusterError;
use crate::cmd::command::CommandError;
use crate::gitops::errors::GitOpsError;
use crate::image::ImageParseError;
use crate::migration::MigrationError;
use crate::registry::errors::RegistryError;

/// Top level error returned at the CLI boundary. Every module keeps its own
/// scoped error enum; this one just wraps them for a single `Result` type
/// at the binary's exit point.
#[derive(Error, Debug)]
pub enum PrivateerError {
    #[error("configuration is invalid: {0}")]
    ConfigInvalid(String),

    #[error("no registries are enabled")]
    NoRegistriesEnabled,

    #[error("github integration is enabled but no token was provided")]
    GithubTokenMissing,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    GitOps(#[from] GitOpsError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    ImageParse(#[from] ImageParseError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("cannot read config file {path}: {raw_error_message}")]
    ConfigReadFailed { path: String, raw_error_message: String },

    #[error("cannot write config file {path}: {raw_error_message}")]
    ConfigWriteFailed { path: String, raw_error_message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
