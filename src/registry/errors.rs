use thiserror::Error;

use crate::cmd::docker::DockerError;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("cannot instantiate client for registry `{registry_name}`: {raw_error_message}")]
    CannotInstantiateClient { registry_name: String, raw_error_message: String },

    #[error("registry `{registry_name}` is unavailable: {raw_error_message}")]
    RegistryUnavailable { registry_name: String, raw_error_message: String },

    #[error("authentication required for registry `{registry_name}`")]
    AuthRequired { registry_name: String },

    #[error("registry `{0}` is not loaded")]
    RegistryNotFound(String),

    #[error("cannot create repository `{repository_name}` in registry `{registry_name}`: {raw_error_message}")]
    CannotCreateRepository {
        registry_name: String,
        repository_name: String,
        raw_error_message: String,
    },

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
